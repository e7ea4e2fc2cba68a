use anyhow::{anyhow, Result};
use log::*;

use crate::gemini::ApiKey;
use crate::services::{Queryable, Request, Sourced};

pub mod fallback;
mod models;

pub use self::models::{MenuItem, Restaurant};

/// Generate a fresh list of restaurants.
#[derive(Debug, Clone)]
pub struct FindRestaurants {
    pub credential: ApiKey,
}

/// Generate the menu of one restaurant.
#[derive(Debug, Clone)]
pub struct GenerateMenu {
    pub credential: ApiKey,
    pub restaurant_name: String,
    pub category: String,
}

impl Request for FindRestaurants {
    type Resp = Vec<Restaurant>;
}

impl Request for GenerateMenu {
    type Resp = Vec<MenuItem>;
}

impl GenerateMenu {
    pub fn for_restaurant(credential: ApiKey, restaurant: &Restaurant) -> Self {
        GenerateMenu {
            credential,
            restaurant_name: restaurant.name.clone(),
            category: restaurant.category.clone(),
        }
    }
}

/// Asks `generator` for the menu, substituting the category's fallback menu
/// when generation fails or comes back empty.
pub fn load_menu<G: Queryable<GenerateMenu>>(
    generator: &G,
    req: GenerateMenu,
) -> Sourced<Vec<MenuItem>> {
    let category = req.category.clone();
    let restaurant_name = req.restaurant_name.clone();

    let cause = match generator.query(req) {
        Ok(menu) if !menu.is_empty() => {
            debug!("Generated {} items for {}", menu.len(), restaurant_name);
            return Sourced::Remote(menu);
        }
        Ok(_) => anyhow!("generated menu for {:?} was empty", restaurant_name),
        Err(e) => e,
    };

    warn!(
        "Menu generation for {:?} failed, using fallback for {:?}: {:#}",
        restaurant_name, category, cause
    );
    let value = fallback::menu_for(&category, &restaurant_name);
    Sourced::Fallback { value, cause }
}

pub fn find_restaurants<G: Queryable<FindRestaurants>>(
    generator: &G,
    req: FindRestaurants,
) -> Result<Vec<Restaurant>> {
    let restaurants = generator.query(req)?;
    info!("Generated {} restaurants", restaurants.len());
    Ok(restaurants)
}
