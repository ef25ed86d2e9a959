use std::collections::VecDeque;
use std::sync::Arc;

use log::debug;

use crate::config::Configuration;

pub const CONFIG_HISTORY_MAX_SIZE: usize = 3;

/// The current configuration plus a short list of earlier ones to revert to.
#[derive(Debug)]
pub struct ConfigHistory {
    current: Option<Arc<Configuration>>,
    previous: VecDeque<Arc<Configuration>>,
    max_size: usize,
}

impl Default for ConfigHistory {
    fn default() -> Self {
        ConfigHistory::with_max_size(CONFIG_HISTORY_MAX_SIZE)
    }
}

impl ConfigHistory {
    pub fn new() -> ConfigHistory {
        ConfigHistory::default()
    }

    pub fn with_max_size(max_size: usize) -> ConfigHistory {
        ConfigHistory {
            current: None,
            previous: VecDeque::with_capacity(max_size + 1),
            max_size,
        }
    }

    pub fn current(&self) -> Option<&Arc<Configuration>> {
        self.current.as_ref()
    }

    /// Makes `config` current. The outgoing configuration, or the one it was
    /// derived from, becomes the most recent history entry.
    pub fn set_current(&mut self, config: Option<Arc<Configuration>>) {
        if let (Some(current), Some(config)) = (&self.current, &config) {
            if Arc::ptr_eq(current, config) {
                return;
            }
        }

        let Some(config) = config else {
            self.current = None;
            return;
        };

        if let Some(outgoing) = self.current.replace(config) {
            if outgoing.has_parent() {
                match outgoing.parent() {
                    Some(parent) => self.push(parent),
                    None => debug!("Parent of the outgoing configuration is gone, not saving it"),
                }
            } else {
                self.push(outgoing);
            }
        }
    }

    fn push(&mut self, config: Arc<Configuration>) {
        self.previous.push_front(config);
        while self.previous.len() > self.max_size {
            self.previous.pop_back();
        }
    }

    pub fn get_previous(&self) -> Option<&Arc<Configuration>> {
        self.previous.front()
    }

    pub fn pop_previous(&mut self) -> Option<Arc<Configuration>> {
        self.previous.pop_front()
    }

    pub fn len(&self) -> usize {
        self.previous.len()
    }

    pub fn is_empty(&self) -> bool {
        self.previous.is_empty()
    }

    /// Forgets the history; the current configuration stays.
    pub fn clear(&mut self) {
        self.previous.clear();
    }
}
