use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use fancontrol::{
    arg_parser::ArgsOptions,
    config_store::ConfigStore,
    fan_curve::BreakpointTable,
    hardware::hwmon::{PwmFan, ThermalZoneSensor},
    lifecycle_manager::LifecycleManager,
    logger,
    settings::Settings,
};
use tokio::{
    select,
    signal::{
        ctrl_c,
        unix::{SignalKind, signal},
    },
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse the command line arguments
    let args_options = ArgsOptions::parse();

    let mut settings = match &args_options.settings_path {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    if let Some(config_dir) = &args_options.config_dir {
        settings.config_dir = config_dir.clone();
    }

    logger::init_logging(Some(&settings.log_path()))?;

    let store = ConfigStore::new(&settings.config_dir);

    if args_options.reset {
        store.save(None)?;
        info!("Default fan curve stored");
    }

    if let Some(path) = &args_options.import_path {
        let table = read_table(path)
            .inspect_err(|err| error!("Error importing fan curve: {err:#}"))?;
        store.save(Some(&table))?;
        info!("Fan curve imported from {:?}", path);
    }

    let table = store.load()?;

    if args_options.dump {
        println!("{}", serde_json::to_string_pretty(&table)?);
        return Ok(());
    }

    let sensor = ThermalZoneSensor::new(&settings.sensor);
    let actuator = PwmFan::new(&settings.actuator);

    let mut manager = LifecycleManager::init(
        table,
        Box::new(sensor),
        Box::new(actuator),
        settings.control.clone(),
    );

    manager.start()?;

    let mut terminate = signal(SignalKind::terminate())?;

    // Run until a termination signal, or until the loop gives up.
    // A loop failure ends the process with an error
    let interrupted = select! {
        received = ctrl_c() => {
            received?;
            true
        },
        _ = terminate.recv() => true,
        result = manager.wait() => {
            result?;
            false
        },
    };

    if interrupted {
        info!("Termination requested");
        manager.stop().await?;
    }

    Ok(())
}

// Read and validate a Json fan curve
fn read_table(path: &Path) -> Result<BreakpointTable> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open fan curve file {path:?}"))?;

    let table = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Invalid fan curve in {path:?}"))?;

    Ok(table)
}
