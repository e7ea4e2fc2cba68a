use err_derive::Error;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::cart::{Cart, SHIPPING_FEE};

pub const PAYMENT_METHODS: &[&str] = &["貨到付款", "信用卡", "LINE Pay"];
pub const FALLBACK_DELIVERY_ESTIMATE: &str = "20-30 分鐘";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidOrder {
    #[error(display = "missing required field: {}", _0)]
    MissingField(&'static str),
    #[error(display = "cannot order from an empty cart")]
    EmptyCart,
}

/// Customer details entered at checkout.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    pub customer_name: String,
    pub customer_phone: String,
    pub delivery_address: String,
    pub payment_method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub name: String,
    pub quantity: u32,
}

/// The order number and delivery estimate handed out for a new order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAssignment {
    pub order_number: String,
    pub estimated_delivery_time: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub subtotal: f64,
    pub shipping_fee: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedOrder {
    #[serde(flatten)]
    pub details: OrderDetails,
    pub order_number: String,
    pub estimated_delivery_time: String,
    pub items: Vec<OrderLine>,
    pub subtotal: f64,
    pub shipping_fee: f64,
    pub total: f64,
}

impl OrderDetails {
    pub fn validate(&self) -> Result<(), InvalidOrder> {
        let required = [
            ("customerName", &self.customer_name),
            ("customerPhone", &self.customer_phone),
            ("deliveryAddress", &self.delivery_address),
            ("paymentMethod", &self.payment_method),
        ];
        for (field, value) in required.iter() {
            if value.trim().is_empty() {
                return Err(InvalidOrder::MissingField(*field));
            }
        }
        Ok(())
    }

    /// Notes with surrounding whitespace removed; blank notes count as none.
    pub fn notes(&self) -> Option<&str> {
        self.order_notes
            .as_ref()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
    }
}

impl OrderAssignment {
    /// A locally made up order number in the `ORD-XXXXXX` format.
    pub fn fallback<R: Rng>(rng: &mut R) -> Self {
        let n: u32 = rng.gen_range(100_000, 1_000_000);
        OrderAssignment {
            order_number: format!("ORD-{}", n),
            estimated_delivery_time: FALLBACK_DELIVERY_ESTIMATE.to_string(),
        }
    }
}

impl Pricing {
    pub fn of(cart: &Cart) -> Self {
        let subtotal = cart.subtotal();
        Pricing {
            subtotal,
            shipping_fee: SHIPPING_FEE,
            total: subtotal + SHIPPING_FEE,
        }
    }
}

impl ConfirmedOrder {
    pub fn new(details: OrderDetails, assignment: OrderAssignment, cart: &Cart) -> Self {
        let Pricing {
            subtotal,
            shipping_fee,
            total,
        } = Pricing::of(cart);
        let items = cart
            .items()
            .iter()
            .map(|row| OrderLine {
                name: row.item.name.clone(),
                quantity: row.quantity,
            })
            .collect();
        ConfirmedOrder {
            details,
            order_number: assignment.order_number,
            estimated_delivery_time: assignment.estimated_delivery_time,
            items,
            subtotal,
            shipping_fee,
            total,
        }
    }

    pub fn item_summary(&self) -> String {
        self.items
            .iter()
            .map(|line| format!("{} x{}", line.name, line.quantity))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
