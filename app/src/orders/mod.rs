use anyhow::Result;
use chrono::{DateTime, Utc};
use log::*;
use rand::Rng;

use crate::cart::Cart;
use crate::gemini::ApiKey;
use crate::services::{Commandable, Queryable, Request, Sourced};

mod models;
pub mod sheet;

pub use self::models::{
    ConfirmedOrder, InvalidOrder, OrderAssignment, OrderDetails, OrderLine, Pricing,
    FALLBACK_DELIVERY_ESTIMATE, PAYMENT_METHODS,
};
pub use self::sheet::{SaveOrder, SaveReceipt, SheetClient, SheetRecord};

/// Ask for an order number and a delivery estimate.
#[derive(Debug, Clone)]
pub struct AssignOrderNumber {
    pub credential: ApiKey,
    pub details: OrderDetails,
    /// `name xN` per cart row.
    pub items: Vec<String>,
}

impl Request for AssignOrderNumber {
    type Resp = OrderAssignment;
}

#[derive(Debug)]
pub struct PlacedOrder {
    pub order: ConfirmedOrder,
    /// Why the order number was made up locally, if it was.
    pub fallback_cause: Option<anyhow::Error>,
    pub receipt: SaveReceipt,
}

pub fn assign_order_number<G, R>(
    generator: &G,
    req: AssignOrderNumber,
    rng: &mut R,
) -> Sourced<OrderAssignment>
where
    G: Queryable<AssignOrderNumber>,
    R: Rng,
{
    match generator.query(req) {
        Ok(assignment) => Sourced::Remote(assignment),
        Err(cause) => {
            let value = OrderAssignment::fallback(rng);
            warn!(
                "Order number generation failed, using {}: {:#}",
                value.order_number, cause
            );
            Sourced::Fallback { value, cause }
        }
    }
}

/// Numbers the order, prices the cart and records the order in the sheet.
///
/// Only returns `Ok` when the sheet acknowledged the order; the cart is not
/// touched either way.
pub fn place_order<G, S, R>(
    generator: &G,
    sheet: &S,
    credential: ApiKey,
    details: OrderDetails,
    cart: &Cart,
    rng: &mut R,
    now: DateTime<Utc>,
) -> Result<PlacedOrder>
where
    G: Queryable<AssignOrderNumber>,
    S: Commandable<SaveOrder>,
    R: Rng,
{
    if cart.is_empty() {
        return Err(InvalidOrder::EmptyCart.into());
    }
    details.validate()?;

    let req = AssignOrderNumber {
        credential,
        details: details.clone(),
        items: cart.items().iter().map(|row| row.summary()).collect(),
    };
    let (assignment, fallback_cause) = match assign_order_number(generator, req, rng) {
        Sourced::Remote(value) => (value, None),
        Sourced::Fallback { value, cause } => (value, Some(cause)),
    };

    let order = ConfirmedOrder::new(details, assignment, cart);
    let record = SheetRecord::of(&order, now);
    debug!("Submitting {:?}", record);
    let receipt = sheet.execute(SaveOrder { record })?;
    info!(
        "Order {} saved, total {}",
        order.order_number, order.total
    );

    Ok(PlacedOrder {
        order,
        fallback_cause,
        receipt,
    })
}
