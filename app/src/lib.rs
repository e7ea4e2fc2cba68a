use anyhow::Result;
use log::*;

use infra::persistence::FileStorage;

pub mod alert;
pub mod cart;
pub mod config;
pub mod console;
pub mod gemini;
pub mod menu;
pub mod orders;
pub mod services;
pub mod shop;
#[cfg(test)]
mod test;

pub type TakeoutShop = shop::Shop<gemini::GeminiClient, orders::SheetClient, FileStorage>;

pub struct Takeout {
    gemini: gemini::GeminiClient,
    sheet: orders::SheetClient,
    storage: FileStorage,
    api_key: Option<gemini::ApiKey>,
}

impl Takeout {
    pub fn new(config: &config::Config) -> Result<Self> {
        let storage = config.storage.build()?;
        let gemini = gemini::GeminiClient::new(&config.gemini)?;
        let sheet = orders::SheetClient::new(&config.sheet)?;
        debug!("Storage at {:?}", storage.root());

        Ok(Takeout {
            gemini,
            sheet,
            storage,
            api_key: config.gemini.api_key.clone(),
        })
    }

    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    pub fn shop(self) -> TakeoutShop {
        info!("Opening shop");
        shop::Shop::new(self.gemini, self.sheet, self.storage, self.api_key)
    }
}
