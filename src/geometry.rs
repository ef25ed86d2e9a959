/// Integer rectangle in layout coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rectangle {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Rectangle {
        Rectangle {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn overlaps(&self, other: &Rectangle) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Shares a non-degenerate stretch of edge with `other`.
    pub fn is_adjacent_to(&self, other: &Rectangle) -> bool {
        let vertical_overlap = self.y < other.bottom() && other.y < self.bottom();
        let horizontal_overlap = self.x < other.right() && other.x < self.right();

        ((self.right() == other.x || other.right() == self.x) && vertical_overlap)
            || ((self.bottom() == other.y || other.bottom() == self.y) && horizontal_overlap)
    }

    /// Smallest rectangle containing every rectangle of the iterator.
    pub fn union_all<'a>(rects: impl IntoIterator<Item = &'a Rectangle>) -> Option<Rectangle> {
        rects.into_iter().fold(None, |acc, rect| {
            Some(match acc {
                None => *rect,
                Some(acc) => {
                    let x = acc.x.min(rect.x);
                    let y = acc.y.min(rect.y);
                    let right = acc.right().max(rect.right());
                    let bottom = acc.bottom().max(rect.bottom());
                    Rectangle::new(x, y, right - x, bottom - y)
                }
            })
        })
    }
}
