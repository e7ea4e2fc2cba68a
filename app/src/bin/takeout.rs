use std::io;
use std::path::PathBuf;

use anyhow::{bail, Result};
use log::*;
use serde::Deserialize;
use structopt::StructOpt;

use infra::persistence::Storage;
use takeout::{
    cart::Cart,
    config::{read_file, EnvLogger},
    console,
    gemini::{ApiKey, API_KEY_KEY},
};

#[derive(Debug, StructOpt)]
#[structopt(name = "takeout", about = "Order food from generated restaurants.")]
struct Opt {
    /// Configuration file
    #[structopt(short = "c", long = "config", parse(from_os_str))]
    config: Option<PathBuf>,
    #[structopt(subcommand)]
    command: Commands,
}

#[derive(Debug, StructOpt)]
enum Commands {
    #[structopt(name = "shop", about = "Start an interactive shopping session")]
    Shop,
    #[structopt(name = "set-key", about = "Remember a Gemini API key")]
    SetKey { key: String },
    #[structopt(name = "forget-key", about = "Forget the stored API key")]
    ForgetKey,
    #[structopt(name = "cart", about = "Show the saved cart")]
    Cart,
}

#[derive(Deserialize, Debug, Default)]
struct Config {
    #[serde(flatten)]
    takeout: takeout::config::Config,
    #[serde(default)]
    env_logger: EnvLogger,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let mut config: Config = match path {
        Some(path) => toml::from_str(&read_file(path)?)?,
        None => Config::default(),
    };
    config.takeout.apply_env()?;
    Ok(config)
}

fn main() -> Result<()> {
    let opt = Opt::from_args();
    let config = load_config(opt.config.as_ref())?;

    config.env_logger.builder().init();
    debug!("Options: {:?}", opt);

    let app = takeout::Takeout::new(&config.takeout)?;

    match opt.command {
        Commands::Shop => {
            let mut shop = app.shop();
            let stdin = io::stdin();
            let stdout = io::stdout();
            console::run(&mut shop, &mut stdin.lock(), &mut stdout.lock())?;
        }
        Commands::SetKey { key } => {
            let key = ApiKey::new(key);
            if key.is_blank() {
                bail!("API key must not be blank");
            }
            app.storage().save(API_KEY_KEY, &key)?;
            info!("Stored API key");
            println!("已儲存 API 金鑰。");
        }
        Commands::ForgetKey => {
            app.storage().remove(API_KEY_KEY)?;
            info!("Removed stored API key");
            println!("已清除 API 金鑰。");
        }
        Commands::Cart => {
            let cart = Cart::load(app.storage())?;
            print!("{}", console::cart_screen(&cart));
        }
    }

    Ok(())
}
