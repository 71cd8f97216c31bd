//! Integration tests for TOML configuration loading.
//!
//! Uses figment::Jail for sandboxed files and env vars.

use figment::{
    Figment, Jail,
    providers::{Format, Serialized, Toml},
};
use perf_config::{Mode, PerfConfig};
use pretty_assertions::assert_eq;

#[test]
fn loads_recording_section_from_toml() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
[recording]
mode = "overwrite"
hide_columns = false
show_diff = false
"#,
        )?;

        let config: PerfConfig = Figment::from(Serialized::defaults(PerfConfig::default()))
            .merge(Toml::file("config.toml"))
            .extract()?;

        assert_eq!(config.recording.mode, Mode::Overwrite);
        assert!(!config.recording.hide_columns);
        assert!(!config.recording.show_diff);
        Ok(())
    });
}

#[test]
fn partial_section_keeps_defaults() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", "[recording]\nmode = \"all\"\n")?;

        let config: PerfConfig = Figment::from(Serialized::defaults(PerfConfig::default()))
            .merge(Toml::file("config.toml"))
            .extract()?;

        assert_eq!(config.recording.mode, Mode::All);
        assert!(config.recording.hide_columns);
        assert!(config.recording.show_diff);
        Ok(())
    });
}

#[test]
fn project_config_is_picked_up() {
    Jail::expect_with(|jail| {
        let xdg = jail.directory().join("xdg");
        jail.set_env("XDG_CONFIG_HOME", xdg.display());
        jail.create_dir(".perfrec")?;
        jail.create_file(".perfrec/config.toml", "[recording]\nmode = \"none\"\n")?;

        let config = PerfConfig::load().expect("config loads");
        assert_eq!(config.recording.mode, Mode::None);
        Ok(())
    });
}

#[test]
fn invalid_mode_fails_extraction() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", "[recording]\nmode = \"sometimes\"\n")?;

        let result: Result<PerfConfig, _> =
            Figment::from(Serialized::defaults(PerfConfig::default()))
                .merge(Toml::file("config.toml"))
                .extract();

        assert!(result.is_err());
        Ok(())
    });
}
