use std::path::PathBuf;

use argparse::{ArgumentParser, Print, StoreOption, StoreTrue};

#[derive(Debug, Default)]
pub struct ArgsOptions {
    pub settings_path: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,

    // Json fan curve to validate and store before starting
    pub import_path: Option<PathBuf>,
    // Store the default fan curve before starting
    pub reset: bool,
    // Print the stored fan curve and exit
    pub dump: bool,
}

impl ArgsOptions {
    pub fn parse() -> Self {
        let mut options = ArgsOptions::default();

        {
            let mut parser = ArgumentParser::new();
            parser.set_description(
                "Drive a fan from a temperature sensor \
                 through a stored fan curve",
            );

            // Settings file path
            parser.refer(&mut options.settings_path).add_option(
                &["-s", "--settings"],
                StoreOption,
                "The file path of the Json settings file",
            );

            // Overrides the config directory from the settings
            parser.refer(&mut options.config_dir).add_option(
                &["-c", "--config-dir"],
                StoreOption,
                "The directory holding the stored fan curve",
            );

            parser.refer(&mut options.import_path).add_option(
                &["--import"],
                StoreOption,
                "Store the fan curve from the given Json file",
            );

            parser.refer(&mut options.reset).add_option(
                &["--reset"],
                StoreTrue,
                "Store the default fan curve",
            );

            parser.refer(&mut options.dump).add_option(
                &["--dump"],
                StoreTrue,
                "Print the stored fan curve as Json and exit",
            );

            // Show daemon version
            parser.add_option(
                &["-V", "--version"],
                Print(env!("CARGO_PKG_VERSION").to_string()),
                "Show the daemon version"
            );

            parser.parse_args_or_exit();
        }

        options
    }
}
