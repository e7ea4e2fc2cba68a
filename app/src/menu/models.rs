use serde::{Deserialize, Serialize};

pub const MAX_RATING: f64 = 5.0;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Restaurant {
    pub id: String,
    pub name: String,
    pub category: String,
    pub rating: f64,
    pub reviews: u32,
    pub delivery_time: String,
    pub min_order: u32,
    pub image: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub restaurant_name: String,
}

impl Restaurant {
    /// Five slots of full, half and empty stars.
    pub fn stars(&self) -> String {
        let rating = self.rating.max(0.0).min(MAX_RATING);
        let full = rating.floor() as usize;
        let half = rating.fract() >= 0.5;
        let empty = 5 - full - if half { 1 } else { 0 };

        let mut out = String::with_capacity(5 * 3);
        out.extend(std::iter::repeat('★').take(full));
        if half {
            out.push('⯪');
        }
        out.extend(std::iter::repeat('☆').take(empty));
        out
    }
}

impl MenuItem {
    pub fn new(id: &str, name: &str, price: f64, restaurant_name: &str) -> Self {
        MenuItem {
            id: id.to_string(),
            name: name.to_string(),
            price,
            restaurant_name: restaurant_name.to_string(),
        }
    }
}
