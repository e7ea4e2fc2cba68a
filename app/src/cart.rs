use std::convert::TryFrom;

use anyhow::Result;
use log::*;
use serde::{Deserialize, Serialize};

use infra::persistence::Storage;

use crate::menu::MenuItem;

/// Storage key of the persisted cart.
pub const CART_KEY: &str = "cart";

/// Flat charge added to every order.
pub const SHIPPING_FEE: f64 = 30.0;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct CartItem {
    #[serde(flatten)]
    pub item: MenuItem,
    pub quantity: u32,
}

/// A row as found in storage, before the quantity is checked.
#[derive(Deserialize, Debug)]
struct StoredItem {
    #[serde(flatten)]
    item: MenuItem,
    quantity: i64,
}

/// Ordered rows of menu items, at most one row per item id.
///
/// Every row has a quantity of at least one; lowering a row to zero
/// removes it.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(transparent)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl CartItem {
    pub fn id(&self) -> &str {
        &self.item.id
    }

    pub fn line_total(&self) -> f64 {
        self.item.price * f64::from(self.quantity)
    }

    /// `name xN`, as it appears in order summaries.
    pub fn summary(&self) -> String {
        format!("{} x{}", self.item.name, self.quantity)
    }
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&CartItem> {
        self.items.iter().find(|row| row.id() == id)
    }

    pub fn add(&mut self, item: &MenuItem) {
        if let Some(row) = self.items.iter_mut().find(|row| row.item.id == item.id) {
            row.quantity = row.quantity.saturating_add(1);
            debug!("Cart: {} now x{}", row.item.name, row.quantity);
            return;
        }
        debug!("Cart: add {}", item.name);
        self.items.push(CartItem {
            item: item.clone(),
            quantity: 1,
        });
    }

    pub fn set_quantity(&mut self, id: &str, quantity: i64) {
        if quantity < 1 {
            self.remove(id);
            return;
        }
        let quantity = if quantity > i64::from(u32::MAX) {
            u32::MAX
        } else {
            quantity as u32
        };
        if let Some(row) = self.items.iter_mut().find(|row| row.item.id == id) {
            row.quantity = quantity;
        }
    }

    pub fn increment(&mut self, id: &str) {
        if let Some(quantity) = self.get(id).map(|row| i64::from(row.quantity)) {
            self.set_quantity(id, quantity + 1);
        }
    }

    pub fn decrement(&mut self, id: &str) {
        if let Some(quantity) = self.get(id).map(|row| i64::from(row.quantity)) {
            self.set_quantity(id, quantity - 1);
        }
    }

    pub fn remove(&mut self, id: &str) {
        self.items.retain(|row| row.item.id != id);
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|row| u64::from(row.quantity)).sum()
    }

    pub fn subtotal(&self) -> f64 {
        self.items.iter().map(CartItem::line_total).sum()
    }

    pub fn total(&self) -> f64 {
        self.subtotal() + SHIPPING_FEE
    }

    /// Restores a cart written by `save`. Rows whose quantity is out of
    /// range, or that repeat an earlier id, are dropped.
    pub fn load<S: Storage>(storage: &S) -> Result<Self> {
        let stored: Option<Vec<StoredItem>> = storage.load(CART_KEY)?;
        let mut cart = Cart::new();
        for row in stored.unwrap_or_default() {
            let quantity = match u32::try_from(row.quantity) {
                Ok(quantity) if quantity > 0 => quantity,
                _ => {
                    warn!("Dropping stored cart row with quantity {:?}", row);
                    continue;
                }
            };
            if cart.get(&row.item.id).is_some() {
                warn!("Dropping duplicate stored cart row: {:?}", row);
                continue;
            }
            cart.items.push(CartItem {
                item: row.item,
                quantity,
            });
        }
        debug!("Restored cart with {} rows", cart.items.len());
        Ok(cart)
    }

    pub fn save<S: Storage>(&self, storage: &S) -> Result<()> {
        storage.save(CART_KEY, self)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use infra::persistence::MemoryStorage;

    fn burger() -> MenuItem {
        MenuItem::new("b1", "Burger", 180.0, "Diner")
    }

    fn fries() -> MenuItem {
        MenuItem::new("f1", "Fries", 80.0, "Diner")
    }

    #[test]
    fn adding_twice_increments_a_single_row() {
        let mut cart = Cart::new();
        cart.add(&burger());
        cart.add(&burger());
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].quantity, 2);
    }

    #[test]
    fn should_total_with_shipping() {
        let mut cart = Cart::new();
        cart.add(&burger());
        cart.add(&burger());
        assert_eq!(cart.subtotal(), 360.0);
        assert_eq!(cart.total(), 390.0);
    }

    #[test]
    fn empty_cart_still_charges_shipping() {
        let cart = Cart::new();
        assert_eq!(cart.subtotal(), 0.0);
        assert_eq!(cart.total(), SHIPPING_FEE);
    }

    #[test]
    fn decrementing_the_last_unit_removes_the_row() {
        let mut cart = Cart::new();
        cart.add(&burger());
        cart.add(&fries());
        cart.decrement("b1");
        assert!(cart.get("b1").is_none());
        assert_eq!(cart.items().len(), 1);
    }

    #[test]
    fn non_positive_quantities_remove_the_row() {
        let mut cart = Cart::new();
        cart.add(&burger());
        cart.set_quantity("b1", -3);
        assert!(cart.is_empty());
    }

    #[test]
    fn removing_an_unknown_item_is_a_no_op() {
        let mut cart = Cart::new();
        cart.add(&burger());
        let before = cart.clone();
        cart.remove("nope");
        cart.set_quantity("nope", 4);
        cart.increment("nope");
        assert_eq!(cart, before);
    }

    #[test]
    fn counts_units_not_rows() {
        let mut cart = Cart::new();
        cart.add(&burger());
        cart.set_quantity("b1", 3);
        cart.add(&fries());
        assert_eq!(cart.item_count(), 4);
        assert_eq!(cart.items()[0].summary(), "Burger x3");
    }

    #[test]
    fn quantities_stay_positive_under_any_sequence() {
        let ids = ["b1", "f1", "zz"];
        let mut cart = Cart::new();
        for step in 0..200i64 {
            let id = ids[(step % 3) as usize];
            match step % 8 {
                0 | 4 => cart.add(&burger()),
                1 => cart.add(&fries()),
                2 => cart.decrement(id),
                3 => cart.set_quantity(id, (step % 5) - 2),
                5 => cart.increment(id),
                6 => cart.set_quantity(id, i64::from(u32::MAX)),
                _ => cart.remove(id),
            }
            assert!(cart.items().iter().all(|row| row.quantity >= 1));
            assert_eq!(cart.total(), cart.subtotal() + SHIPPING_FEE);
        }
    }

    #[test]
    fn adding_past_the_largest_quantity_saturates() {
        let mut cart = Cart::new();
        cart.add(&burger());
        cart.set_quantity("b1", i64::from(u32::MAX) + 10);
        assert_eq!(cart.get("b1").map(|row| row.quantity), Some(u32::MAX));

        cart.add(&burger());
        cart.increment("b1");
        assert_eq!(cart.get("b1").map(|row| row.quantity), Some(u32::MAX));
        assert!(cart.items().iter().all(|row| row.quantity >= 1));

        cart.decrement("b1");
        assert_eq!(cart.get("b1").map(|row| row.quantity), Some(u32::MAX - 1));
    }

    #[test]
    fn should_persist_flattened_rows() -> Result<()> {
        let storage = MemoryStorage::new();
        let mut cart = Cart::new();
        cart.add(&burger());
        cart.save(&storage)?;

        let raw: serde_json::Value = storage.load(CART_KEY)?.expect("stored cart");
        assert_eq!(
            raw,
            serde_json::json!([{
                "id": "b1",
                "name": "Burger",
                "price": 180.0,
                "restaurantName": "Diner",
                "quantity": 1
            }])
        );

        assert_eq!(Cart::load(&storage)?, cart);
        Ok(())
    }

    #[test]
    fn should_drop_invalid_stored_rows() -> Result<()> {
        let storage = MemoryStorage::new();
        storage.save_raw(
            CART_KEY,
            r#"[
                {"id":"b1","name":"Burger","price":180,"restaurantName":"Diner","quantity":0},
                {"id":"f1","name":"Fries","price":80,"restaurantName":"Diner","quantity":2},
                {"id":"f1","name":"Fries","price":80,"restaurantName":"Diner","quantity":5},
                {"id":"s1","name":"Soda","price":40,"restaurantName":"Diner","quantity":-1},
                {"id":"w1","name":"Water","price":10,"restaurantName":"Diner","quantity":4294967296},
                {"id":"c1","name":"Cola","price":45,"restaurantName":"Diner","quantity":3}
            ]"#,
        )?;
        let cart = Cart::load(&storage)?;
        assert_eq!(cart.items().len(), 2);
        assert_eq!(cart.get("f1").map(|r| r.quantity), Some(2));
        assert_eq!(cart.get("c1").map(|r| r.quantity), Some(3));
        assert!(cart.get("s1").is_none());
        assert!(cart.get("w1").is_none());
        Ok(())
    }

    #[test]
    fn missing_cart_loads_empty() -> Result<()> {
        assert!(Cart::load(&MemoryStorage::new())?.is_empty());
        Ok(())
    }
}
