//! Test data builders for creating controller configs

use plotembed_rs::{AppConfig, LaunchProfile};

/// Builder for launch configs pointing at small shell tools
pub struct ConfigBuilder {
    profile: LaunchProfile,
    attach_timeout_ms: u64,
}

impl ConfigBuilder {
    pub fn new(program: &str) -> Self {
        Self {
            profile: LaunchProfile::for_program(program),
            attach_timeout_ms: 0,
        }
    }

    /// `sh -c <script>`
    pub fn shell(script: &str) -> Self {
        Self::new("sh").args(&["-c", script])
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.profile.args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn setup_template(mut self, template: &str) -> Self {
        self.profile.setup_template = template.to_string();
        self
    }

    pub fn initial_commands(mut self, commands: &[&str]) -> Self {
        self.profile.initial_commands = commands.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn attach_timeout_ms(mut self, ms: u64) -> Self {
        self.attach_timeout_ms = ms;
        self
    }

    pub fn build(self) -> AppConfig {
        let mut config = AppConfig::with_profile(self.profile);
        config.worker.attach_timeout_ms = self.attach_timeout_ms;
        config.worker.exit_poll_interval_ms = 10;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::shell("cat")
            .initial_commands(&["plot x"])
            .attach_timeout_ms(100)
            .build();

        assert_eq!(config.launch.program.to_str(), Some("sh"));
        assert_eq!(config.launch.args, vec!["-c", "cat"]);
        assert_eq!(config.launch.initial_commands, vec!["plot x"]);
        assert_eq!(config.worker.attach_timeout_ms, 100);
    }
}
