use quick_xml::escape::escape;

use crate::config::Configuration;
use crate::modes::{ModeSpec, RefreshRateMode};
use crate::monitor::{ColorMode, LogicalMonitorConfig, MonitorConfig, MonitorSpec, MonitorTransform, RgbRange};
use crate::parser::MONITORS_CONFIG_FORMAT_VERSION;

const INDENT: &str = "  ";

struct DocumentBuilder {
    out: String,
    depth: usize,
}

impl DocumentBuilder {
    fn new() -> DocumentBuilder {
        DocumentBuilder {
            out: String::new(),
            depth: 0,
        }
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
    }

    fn open(&mut self, element: &str) {
        self.indent();
        self.out.push('<');
        self.out.push_str(element);
        self.out.push_str(">\n");
        self.depth += 1;
    }

    fn close(&mut self, element: &str) {
        self.depth -= 1;
        self.indent();
        self.out.push_str("</");
        self.out.push_str(element);
        self.out.push_str(">\n");
    }

    fn leaf(&mut self, element: &str, value: &str) {
        self.indent();
        self.out.push_str(&format!("<{element}>{}</{element}>\n", escape(value)));
    }

    fn yes(&mut self, element: &str) {
        self.leaf(element, "yes");
    }

    fn monitor_spec(&mut self, monitor_spec: &MonitorSpec) {
        self.open("monitorspec");
        self.leaf("connector", &monitor_spec.connector);
        self.leaf("vendor", &monitor_spec.vendor);
        self.leaf("product", &monitor_spec.product);
        self.leaf("serial", &monitor_spec.serial);
        self.close("monitorspec");
    }

    fn mode(&mut self, mode: &ModeSpec) {
        self.open("mode");
        self.leaf("width", &mode.width.to_string());
        self.leaf("height", &mode.height.to_string());
        self.leaf("rate", &format!("{:.3}", mode.refresh_rate));
        if mode.refresh_rate_mode == RefreshRateMode::Variable {
            self.leaf("ratemode", mode.refresh_rate_mode.as_str());
        }
        if mode.is_interlaced() {
            self.leaf("flag", "interlace");
        }
        self.close("mode");
    }

    fn monitor(&mut self, monitor_config: &MonitorConfig) {
        self.open("monitor");
        self.monitor_spec(&monitor_config.monitor_spec);
        self.mode(&monitor_config.mode_spec);
        if monitor_config.underscanning {
            self.yes("underscanning");
        }
        if monitor_config.rgb_range != RgbRange::Auto {
            self.leaf("rgbrange", monitor_config.rgb_range.as_str());
        }
        if monitor_config.color_mode != ColorMode::Default {
            self.leaf("colormode", monitor_config.color_mode.as_str());
        }
        if let Some(max_bpc) = monitor_config.max_bpc {
            self.leaf("maxbpc", &max_bpc.to_string());
        }
        self.close("monitor");
    }

    fn logical_monitor(&mut self, logical_monitor: &LogicalMonitorConfig) {
        self.open("logicalmonitor");
        self.leaf("x", &logical_monitor.layout.x.to_string());
        self.leaf("y", &logical_monitor.layout.y.to_string());
        self.leaf("scale", &logical_monitor.scale.to_string());
        if logical_monitor.is_primary {
            self.yes("primary");
        }
        if logical_monitor.is_presentation {
            self.yes("presentation");
        }
        if logical_monitor.transform != MonitorTransform::Normal {
            let (rotation, flipped) = logical_monitor.transform.parts();
            self.open("transform");
            self.leaf("rotation", rotation);
            self.leaf("flipped", if flipped { "yes" } else { "no" });
            self.close("transform");
        }
        for monitor_config in &logical_monitor.monitor_configs {
            self.monitor(monitor_config);
        }
        self.close("logicalmonitor");
    }

    fn spec_list(&mut self, element: &str, monitor_specs: &[MonitorSpec]) {
        if monitor_specs.is_empty() {
            return;
        }
        self.open(element);
        for monitor_spec in monitor_specs {
            self.monitor_spec(monitor_spec);
        }
        self.close(element);
    }

    fn configuration(&mut self, config: &Configuration) {
        self.open("configuration");
        self.leaf("layoutmode", config.layout_mode().as_str());
        for logical_monitor in config.logical_monitor_configs() {
            self.logical_monitor(logical_monitor);
        }
        self.spec_list("disabled", config.disabled_monitor_specs());
        self.spec_list("forlease", config.for_lease_monitor_specs());
        self.close("configuration");
    }
}

/// Serializes configurations into a version 2 monitors document.
/// System configurations are left out; they are never written back.
pub fn generate_document<'a>(configs: impl IntoIterator<Item = &'a Configuration>) -> String {
    let mut builder = DocumentBuilder::new();
    builder
        .out
        .push_str(&format!("<monitors version=\"{MONITORS_CONFIG_FORMAT_VERSION}\">\n"));
    builder.depth = 1;

    for config in configs {
        if config.is_system_config() {
            continue;
        }
        builder.configuration(config);
    }

    builder.out.push_str("</monitors>\n");
    builder.out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigFlags, LayoutMode};
    use crate::modes::ModeFlags;
    use crate::parser::parse_document;
    use crate::validator::LayoutValidator;

    fn config(flags: ConfigFlags) -> Configuration {
        let spec = MonitorSpec::new("DP-1", "Fancy & Co", "Monitor <X>", "0001");
        let mut monitor = MonitorConfig::new(spec, ModeSpec::new(1920, 1080, 60.0));
        monitor.max_bpc = Some(8);
        let mut logical_monitor = LogicalMonitorConfig::new(0, 0, 1.0, vec![monitor]);
        logical_monitor.layout.width = 1920;
        logical_monitor.layout.height = 1080;
        logical_monitor.is_primary = true;
        Configuration::new(
            vec![logical_monitor],
            vec![MonitorSpec::new("HDMI-1", "Other", "Screen", "0002")],
            vec![],
            LayoutMode::Physical,
            flags,
        )
    }

    #[test]
    fn writes_the_expected_layout() {
        let document = generate_document([&config(ConfigFlags::empty())]);
        let expected = "\
<monitors version=\"2\">
  <configuration>
    <layoutmode>physical</layoutmode>
    <logicalmonitor>
      <x>0</x>
      <y>0</y>
      <scale>1</scale>
      <primary>yes</primary>
      <monitor>
        <monitorspec>
          <connector>DP-1</connector>
          <vendor>Fancy &amp; Co</vendor>
          <product>Monitor &lt;X&gt;</product>
          <serial>0001</serial>
        </monitorspec>
        <mode>
          <width>1920</width>
          <height>1080</height>
          <rate>60.000</rate>
        </mode>
        <maxbpc>8</maxbpc>
      </monitor>
    </logicalmonitor>
    <disabled>
      <monitorspec>
        <connector>HDMI-1</connector>
        <vendor>Other</vendor>
        <product>Screen</product>
        <serial>0002</serial>
      </monitorspec>
    </disabled>
  </configuration>
</monitors>
";
        assert_eq!(document, expected);
    }

    #[test]
    fn system_configs_are_skipped() {
        let document = generate_document([&config(ConfigFlags::SYSTEM_CONFIG)]);
        assert_eq!(document, "<monitors version=\"2\">\n</monitors>\n");
    }

    #[test]
    fn written_document_reads_back() {
        let original = config(ConfigFlags::empty());
        let document = generate_document([&original]);
        let parsed = parse_document(&document, ConfigFlags::empty(), &LayoutValidator).unwrap();
        assert_eq!(parsed.configs.get(original.key()), Some(&original));
    }

    #[test]
    fn every_attribute_survives_a_round_trip() {
        let mut mode = ModeSpec::new(1920, 1080, 59.94);
        mode.refresh_rate_mode = RefreshRateMode::Variable;
        mode.flags |= ModeFlags::INTERLACE;
        let mut monitor = MonitorConfig::new(MonitorSpec::new("DP-1", "Vendor", "Product", "a"), mode);
        monitor.underscanning = true;
        monitor.max_bpc = Some(10);
        monitor.rgb_range = RgbRange::Full;
        monitor.color_mode = ColorMode::Bt2100;

        let mut rotated = LogicalMonitorConfig::new(0, 0, 1.0, vec![monitor]);
        rotated.transform = MonitorTransform::FlippedRight;
        rotated.is_primary = true;
        rotated.is_presentation = true;
        rotated.derive_layout(LayoutMode::Physical).unwrap();

        let mut scaled = LogicalMonitorConfig::new(
            1080,
            0,
            2.0,
            vec![MonitorConfig::new(
                MonitorSpec::new("DP-2", "Vendor", "Product", "b"),
                ModeSpec::new(2560, 1440, 144.0),
            )],
        );
        scaled.derive_layout(LayoutMode::Physical).unwrap();

        let leased = MonitorSpec::new("DP-3", "Vendor", "Headset", "vr");
        let physical = Configuration::new(
            vec![rotated, scaled],
            vec![MonitorSpec::new("HDMI-1", "Vendor", "Product", "c"), leased.clone()],
            vec![leased],
            LayoutMode::Physical,
            ConfigFlags::empty(),
        );

        let mut fractional = LogicalMonitorConfig::new(
            0,
            0,
            1.25,
            vec![MonitorConfig::new(
                MonitorSpec::new("eDP-1", "Vendor", "Panel", "d"),
                ModeSpec::new(2560, 1440, 60.0),
            )],
        );
        fractional.derive_layout(LayoutMode::Logical).unwrap();
        let logical = Configuration::new(
            vec![fractional],
            vec![],
            vec![],
            LayoutMode::Logical,
            ConfigFlags::empty(),
        );

        let document = generate_document([&physical, &logical]);
        assert!(document.contains("<forlease>"));
        assert!(document.contains("<rotation>right</rotation>"));
        assert!(document.contains("<flipped>yes</flipped>"));
        assert!(document.contains("<rate>59.940</rate>"));
        assert!(document.contains("<scale>1.25</scale>"));

        let parsed = parse_document(&document, ConfigFlags::empty(), &LayoutValidator).unwrap();
        assert!(parsed.rejected.is_empty());
        assert_eq!(parsed.configs.len(), 2);
        assert_eq!(parsed.configs.get(physical.key()), Some(&physical));
        assert_eq!(parsed.configs.get(logical.key()), Some(&logical));
    }
}
