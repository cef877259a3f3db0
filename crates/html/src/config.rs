/// Configuration for a render.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderConfig {
    /// Emit the client bootstrap script before the first suspense patch.
    pub auto_script: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { auto_script: true }
    }
}

impl RenderConfig {
    /// Defaults, overridden by `RIVULET_AUTO_SCRIPT=0|1` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = std::env::var("RIVULET_AUTO_SCRIPT")
            && let Some(flag) = parse_flag(&value)
        {
            config.auto_script = flag;
        }
        config
    }

    pub fn without_script() -> Self {
        Self { auto_script: false }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
