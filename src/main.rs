use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use lockscreen_overlay::logging;
use lockscreen_overlay::replay::{self, Scenario};
use lockscreen_overlay::Settings;

#[derive(Parser, Debug)]
#[command(name = "overlay_replay")]
#[command(about = "Replay a scripted lock-screen scenario against the overlay engine", long_about = None)]
struct Args {
    /// Scenario file (JSON)
    #[arg(value_name = "SCENARIO")]
    scenario: PathBuf,

    /// Engine settings file; defaults apply when omitted
    #[arg(short, long, value_name = "FILE")]
    settings: Option<String>,

    /// Log at debug level (RUST_LOG may refine it)
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let settings = match &args.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let log_file = settings.log_file.as_ref().map(PathBuf::from);
    logging::init(args.debug || settings.debug_logging, log_file);

    let scenario = Scenario::load(&args.scenario)?;
    tracing::info!(
        scenario = %args.scenario.display(),
        steps = scenario.steps.len(),
        surfaces = scenario.surfaces.len(),
        "replaying"
    );
    let report = replay::run(&scenario, settings)?;

    for step in &report.steps {
        let label = serde_json::to_string(&step.step)?;
        let marker = if step.settled { "" } else { " (unsettled)" };
        println!("#{} {label}{marker}", step.index);
        for call in &step.calls {
            println!("    {call:?}");
        }
    }
    for surface in &report.surfaces {
        println!(
            "{} on {}: attached={} mode={:?}",
            surface.surface, surface.display, surface.attached, surface.mode
        );
    }
    for record in &report.records {
        println!(
            "{} rev {}: screen_on={} keyguard={} lockscreen={} shade={} notifications={}",
            record.display,
            record.revision,
            record.is_screen_on,
            record.was_on_keyguard,
            record.on_main_lockscreen,
            record.showing_notifications_panel,
            record.notification_count
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_scenario_and_flags() {
        let args =
            Args::try_parse_from(["overlay_replay", "--debug", "run.json", "--settings", "s.json"])
                .unwrap();
        assert_eq!(args.scenario, PathBuf::from("run.json"));
        assert_eq!(args.settings.as_deref(), Some("s.json"));
        assert!(args.debug);
    }

    #[test]
    fn scenario_is_required() {
        assert!(Args::try_parse_from(["overlay_replay"]).is_err());
        assert!(Args::try_parse_from(["overlay_replay", "a.json", "--settings"]).is_err());
    }
}
