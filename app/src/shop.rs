//! The shop's state container and the single update path for user actions.

use std::time::Instant;

use anyhow::{Error, Result};
use chrono::Utc;
use log::*;

use infra::persistence::Storage;

use crate::alert::Alert;
use crate::cart::Cart;
use crate::gemini::{ApiKey, GenerationError, API_KEY_KEY};
use crate::menu::{self, FindRestaurants, GenerateMenu, MenuItem, Restaurant};
use crate::orders::{
    self, sheet::SaveError, AssignOrderNumber, ConfirmedOrder, InvalidOrder, OrderDetails,
    SaveOrder,
};
use crate::services::{Commandable, Queryable, Sourced};

const MSG_BLANK_KEY: &str = "請輸入有效的 API 金鑰。";
const MSG_KEY_REJECTED: &str = "API 金鑰無效，請重新輸入。";
const MSG_RESTAURANTS_FAILED: &str = "無法生成餐廳資料。請檢查您的 API 金鑰或網路連線。";
const MSG_UNKNOWN_RESTAURANT: &str = "找不到這家餐廳，請重新選擇。";
const MSG_MENU_FALLBACK: &str = "無法生成菜單，已為您顯示推薦菜單。";
const MSG_EMPTY_CART: &str = "您的購物車是空的。";
const MSG_MISSING_FIELDS: &str = "請填寫所有必填欄位。";
const MSG_SAVE_FAILED: &str = "儲存訂單至 Google Sheet 時發生未知錯誤。請稍後再試。";
const MSG_ORDER_PLACED: &str = "訂單已成功送出！";
const MSG_STORAGE_FAILED: &str = "無法儲存資料到本機。";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    ApiKeySetup,
    Restaurants,
    Menu,
    Cart,
    Checkout,
    Confirmation,
}

/// Everything that happens in the shop, as one value per user action.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SubmitCredential(String),
    ForgetCredential,
    RefreshRestaurants,
    SelectRestaurant(String),
    AddToCart(String),
    SetQuantity(String, i64),
    Increment(String),
    Decrement(String),
    RemoveFromCart(String),
    ShowCart,
    Back,
    Checkout,
    SubmitOrder(OrderDetails),
    NewOrder,
    DismissAlert,
}

#[derive(Debug)]
pub struct ShopState {
    pub view: View,
    pub restaurants: Vec<Restaurant>,
    pub selected: Option<Restaurant>,
    pub menu: Vec<MenuItem>,
    pub cart: Cart,
    pub order: Option<ConfirmedOrder>,
    pub alert: Option<Alert>,
    credential: Option<ApiKey>,
}

/// Drives the views over a generative service `G`, an order sheet `S` and
/// local storage `St`.
pub struct Shop<G, S, St> {
    generator: G,
    sheet: S,
    storage: St,
    state: ShopState,
}

impl ShopState {
    fn new(cart: Cart, credential: Option<ApiKey>) -> Self {
        let view = if credential.is_some() {
            View::Restaurants
        } else {
            View::ApiKeySetup
        };
        ShopState {
            view,
            restaurants: Vec::new(),
            selected: None,
            menu: Vec::new(),
            cart,
            order: None,
            alert: None,
            credential,
        }
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    /// The current alert, unless it has timed out.
    pub fn alert_at(&self, now: Instant) -> Option<&Alert> {
        self.alert.as_ref().filter(|a| !a.is_expired(now))
    }

    fn expire_alert(&mut self, now: Instant) {
        if self.alert.as_ref().map_or(false, |a| a.is_expired(now)) {
            self.alert = None;
        }
    }
}

impl<G, S, St> Shop<G, S, St>
where
    G: Queryable<FindRestaurants> + Queryable<GenerateMenu> + Queryable<AssignOrderNumber>,
    S: Commandable<SaveOrder>,
    St: Storage,
{
    /// Restores the cart and credential from `storage`. A configured
    /// credential takes precedence over the stored one and is never written
    /// back.
    pub fn new(generator: G, sheet: S, storage: St, configured: Option<ApiKey>) -> Self {
        let cart = Cart::load(&storage).unwrap_or_else(|e| {
            warn!("Discarding unreadable stored cart: {:#}", e);
            Cart::new()
        });
        let credential = configured.or_else(|| match storage.load::<ApiKey>(API_KEY_KEY) {
            Ok(key) => key.filter(|k| !k.is_blank()),
            Err(e) => {
                warn!("Ignoring unreadable stored credential: {:#}", e);
                None
            }
        });
        let state = ShopState::new(cart, credential);
        info!("Shop starting in {:?} view", state.view);
        Shop {
            generator,
            sheet,
            storage,
            state,
        }
    }

    pub fn state(&self) -> &ShopState {
        &self.state
    }

    pub fn storage(&self) -> &St {
        &self.storage
    }

    /// Loads the first restaurant list when a credential is already known.
    pub fn start(&mut self) {
        if self.state.view == View::Restaurants {
            self.load_restaurants();
        }
    }

    pub fn dispatch(&mut self, action: Action) {
        self.state.expire_alert(Instant::now());
        debug!("Dispatch {:?} in {:?}", action, self.state.view);
        match action {
            Action::SubmitCredential(key) => self.submit_credential(key),
            Action::ForgetCredential => self.forget_credential(),
            Action::RefreshRestaurants => {
                if self.state.has_credential() {
                    self.state.view = View::Restaurants;
                    self.load_restaurants();
                }
            }
            Action::SelectRestaurant(id) => self.select_restaurant(&id),
            Action::AddToCart(id) => self.add_to_cart(&id),
            Action::SetQuantity(id, quantity) => {
                self.state.cart.set_quantity(&id, quantity);
                self.persist_cart();
            }
            Action::Increment(id) => {
                self.state.cart.increment(&id);
                self.persist_cart();
            }
            Action::Decrement(id) => {
                self.state.cart.decrement(&id);
                self.persist_cart();
            }
            Action::RemoveFromCart(id) => {
                self.state.cart.remove(&id);
                self.persist_cart();
            }
            Action::ShowCart => {
                if self.state.view != View::ApiKeySetup {
                    self.state.view = View::Cart;
                }
            }
            Action::Back => self.back(),
            Action::Checkout => self.checkout(),
            Action::SubmitOrder(details) => self.submit_order(details),
            Action::NewOrder => self.home(),
            Action::DismissAlert => self.state.alert = None,
        }
    }

    fn submit_credential(&mut self, key: String) {
        let key = ApiKey::new(key);
        if key.is_blank() {
            self.state.alert = Some(Alert::error(MSG_BLANK_KEY));
            return;
        }
        if let Err(e) = self.storage.save(API_KEY_KEY, &key) {
            error!("Could not store credential: {:#}", e);
            self.state.alert = Some(Alert::error(MSG_STORAGE_FAILED));
        }
        self.state.credential = Some(key);
        self.state.view = View::Restaurants;
        self.load_restaurants();
    }

    fn forget_credential(&mut self) {
        if let Err(e) = self.storage.remove(API_KEY_KEY) {
            error!("Could not remove stored credential: {:#}", e);
        }
        self.state.credential = None;
        self.state.restaurants.clear();
        self.state.selected = None;
        self.state.menu.clear();
        self.state.view = View::ApiKeySetup;
    }

    fn reject_credential(&mut self, cause: &Error) {
        warn!("Credential rejected: {:#}", cause);
        self.forget_credential();
        self.state.alert = Some(Alert::error(MSG_KEY_REJECTED));
    }

    fn credential(&self) -> ApiKey {
        self.state
            .credential
            .clone()
            .unwrap_or_else(|| ApiKey::new(""))
    }

    fn load_restaurants(&mut self) {
        let req = FindRestaurants {
            credential: self.credential(),
        };
        match menu::find_restaurants(&self.generator, req) {
            Ok(restaurants) => self.state.restaurants = restaurants,
            Err(e) if GenerationError::is_credential_rejected(&e) => self.reject_credential(&e),
            Err(e) => {
                error!("Restaurant generation failed: {:#}", e);
                self.state.restaurants.clear();
                self.state.alert = Some(Alert::error(MSG_RESTAURANTS_FAILED));
            }
        }
    }

    fn select_restaurant(&mut self, id: &str) {
        let restaurant = match self.state.restaurants.iter().find(|r| r.id == id) {
            Some(r) => r.clone(),
            None => {
                warn!("No restaurant with id {:?}", id);
                self.state.selected = None;
                self.state.menu.clear();
                self.state.view = View::Restaurants;
                self.state.alert = Some(Alert::error(MSG_UNKNOWN_RESTAURANT));
                return;
            }
        };

        let req = GenerateMenu::for_restaurant(self.credential(), &restaurant);
        let items = match menu::load_menu(&self.generator, req) {
            Sourced::Fallback { cause, .. } if GenerationError::is_credential_rejected(&cause) => {
                self.reject_credential(&cause);
                return;
            }
            items => items,
        };
        if items.is_fallback() {
            self.state.alert = Some(Alert::error(MSG_MENU_FALLBACK));
        }
        self.state.menu = items.into_value();
        self.state.selected = Some(restaurant);
        self.state.view = View::Menu;
    }

    fn add_to_cart(&mut self, id: &str) {
        let item = match self.state.menu.iter().find(|item| item.id == id) {
            Some(item) => item.clone(),
            None => {
                warn!("No menu item with id {:?}", id);
                return;
            }
        };
        self.state.cart.add(&item);
        self.state.alert = Some(Alert::success(format!("已將 {} 加入購物車", item.name)));
        self.persist_cart();
    }

    fn persist_cart(&mut self) {
        if let Err(e) = self.state.cart.save(&self.storage) {
            error!("Could not persist cart: {:#}", e);
            self.state.alert = Some(Alert::error(MSG_STORAGE_FAILED));
        }
    }

    fn back(&mut self) {
        self.state.view = match self.state.view {
            View::Menu => {
                self.state.selected = None;
                self.state.menu.clear();
                View::Restaurants
            }
            View::Cart if self.state.selected.is_some() => View::Menu,
            View::Cart => View::Restaurants,
            View::Checkout => View::Cart,
            other => other,
        };
    }

    fn checkout(&mut self) {
        if self.state.cart.is_empty() {
            self.state.alert = Some(Alert::error(MSG_EMPTY_CART));
            return;
        }
        self.state.view = View::Checkout;
    }

    fn submit_order(&mut self, details: OrderDetails) {
        if self.state.view != View::Checkout {
            warn!("Ignoring order submitted from {:?}", self.state.view);
            return;
        }
        let placed = orders::place_order(
            &self.generator,
            &self.sheet,
            self.credential(),
            details,
            &self.state.cart,
            &mut rand::thread_rng(),
            Utc::now(),
        );
        match placed {
            Ok(placed) => {
                self.state.order = Some(placed.order);
                self.state.cart.clear();
                self.persist_cart();
                self.state.view = View::Confirmation;
                self.state.alert = Some(Alert::success(MSG_ORDER_PLACED));
            }
            Err(e) => {
                error!("Order submission failed: {:#}", e);
                self.state.alert = Some(Alert::error(order_failure_message(&e)));
            }
        }
    }

    fn home(&mut self) {
        self.state.selected = None;
        self.state.menu.clear();
        self.state.alert = None;
        self.state.order = None;
        self.state.view = if self.state.has_credential() {
            View::Restaurants
        } else {
            View::ApiKeySetup
        };
    }
}

fn order_failure_message(err: &Error) -> String {
    if let Some(invalid) = err.downcast_ref::<InvalidOrder>() {
        return match invalid {
            InvalidOrder::EmptyCart => MSG_EMPTY_CART.to_string(),
            InvalidOrder::MissingField(_) => MSG_MISSING_FIELDS.to_string(),
        };
    }
    match err.downcast_ref::<SaveError>() {
        Some(SaveError::Refused(reason)) => format!("訂單送出失敗：{}", reason),
        _ => MSG_SAVE_FAILED.to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::alert::AlertKind;
    use crate::cart::CART_KEY;
    use crate::orders::{OrderAssignment, SaveReceipt, SheetRecord};
    use anyhow::anyhow;
    use infra::persistence::MemoryStorage;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Service {
        reject_key: bool,
        no_restaurants: bool,
        no_menu: bool,
        no_numbers: bool,
        calls: RefCell<Vec<&'static str>>,
    }

    #[derive(Default)]
    struct Sheet {
        refuse: bool,
        saved: RefCell<Vec<SheetRecord>>,
    }

    impl Service {
        fn call(&self, name: &'static str, failing: bool) -> Result<()> {
            self.calls.borrow_mut().push(name);
            if self.reject_key {
                return Err(GenerationError::CredentialRejected(400).into());
            }
            if failing {
                return Err(anyhow!("{} unavailable", name));
            }
            Ok(())
        }
    }

    impl Queryable<FindRestaurants> for Service {
        fn query(&self, _: FindRestaurants) -> Result<Vec<Restaurant>> {
            self.call("restaurants", self.no_restaurants)?;
            Ok(vec![Restaurant {
                id: "r1".into(),
                name: "漢堡王國".into(),
                category: "美式漢堡".into(),
                rating: 4.5,
                reviews: 120,
                delivery_time: "20-30 分鐘".into(),
                min_order: 150,
                image: "https://picsum.photos/500/300".into(),
            }])
        }
    }

    impl Queryable<GenerateMenu> for Service {
        fn query(&self, req: GenerateMenu) -> Result<Vec<MenuItem>> {
            self.call("menu", self.no_menu)?;
            Ok(vec![MenuItem::new(
                "m1",
                "經典漢堡",
                180.0,
                &req.restaurant_name,
            )])
        }
    }

    impl Queryable<AssignOrderNumber> for Service {
        fn query(&self, _: AssignOrderNumber) -> Result<OrderAssignment> {
            self.call("order", self.no_numbers)?;
            Ok(OrderAssignment {
                order_number: "ORD-246810".into(),
                estimated_delivery_time: "25-35 分鐘".into(),
            })
        }
    }

    impl Commandable<SaveOrder> for Sheet {
        fn execute(&self, req: SaveOrder) -> Result<SaveReceipt> {
            if self.refuse {
                return Err(SaveError::Refused("試算表忙碌中".into()).into());
            }
            self.saved.borrow_mut().push(req.record);
            Ok(SaveReceipt { message: None })
        }
    }

    type TestShop<'a> = Shop<&'a Service, &'a Sheet, MemoryStorage>;

    fn keyed_storage() -> MemoryStorage {
        let storage = MemoryStorage::new();
        storage
            .save(API_KEY_KEY, &ApiKey::new("stored-key"))
            .expect("save key");
        storage
    }

    fn details() -> OrderDetails {
        OrderDetails {
            customer_name: "王小明".into(),
            customer_phone: "0912345678".into(),
            delivery_address: "台北市信義區".into(),
            payment_method: "信用卡".into(),
            order_notes: None,
        }
    }

    fn at_checkout<'a>(service: &'a Service, sheet: &'a Sheet) -> TestShop<'a> {
        let mut shop = Shop::new(service, sheet, keyed_storage(), None);
        shop.start();
        shop.dispatch(Action::SelectRestaurant("r1".into()));
        shop.dispatch(Action::AddToCart("m1".into()));
        shop.dispatch(Action::AddToCart("m1".into()));
        shop.dispatch(Action::ShowCart);
        shop.dispatch(Action::Checkout);
        assert_eq!(shop.state().view, View::Checkout);
        shop
    }

    #[test]
    fn starts_in_setup_without_credential() {
        let service = Service::default();
        let sheet = Sheet::default();
        let mut shop = Shop::new(&service, &sheet, MemoryStorage::new(), None);
        shop.start();
        assert_eq!(shop.state().view, View::ApiKeySetup);
        assert!(service.calls.borrow().is_empty());

        shop.dispatch(Action::ShowCart);
        assert_eq!(shop.state().view, View::ApiKeySetup);
    }

    #[test]
    fn submitted_credential_is_stored() -> Result<()> {
        let service = Service::default();
        let sheet = Sheet::default();
        let mut shop = Shop::new(&service, &sheet, MemoryStorage::new(), None);

        shop.dispatch(Action::SubmitCredential("   ".into()));
        assert_eq!(shop.state().view, View::ApiKeySetup);
        assert_eq!(
            shop.state().alert.as_ref().map(|a| a.kind),
            Some(AlertKind::Error)
        );

        shop.dispatch(Action::SubmitCredential(" AIza-new ".into()));
        assert_eq!(shop.state().view, View::Restaurants);
        assert_eq!(shop.state().restaurants.len(), 1);
        let stored: Option<ApiKey> = shop.storage().load(API_KEY_KEY)?;
        assert_eq!(stored, Some(ApiKey::new("AIza-new")));
        Ok(())
    }

    #[test]
    fn configured_credential_is_not_stored() -> Result<()> {
        let service = Service::default();
        let sheet = Sheet::default();
        let shop = Shop::new(
            &service,
            &sheet,
            MemoryStorage::new(),
            Some(ApiKey::new("from-env")),
        );
        assert_eq!(shop.state().view, View::Restaurants);
        let stored: Option<ApiKey> = shop.storage().load(API_KEY_KEY)?;
        assert!(stored.is_none());
        Ok(())
    }

    #[test]
    fn restaurant_failure_leaves_empty_list() {
        let service = Service {
            no_restaurants: true,
            ..Service::default()
        };
        let sheet = Sheet::default();
        let mut shop = Shop::new(&service, &sheet, keyed_storage(), None);
        shop.start();
        assert_eq!(shop.state().view, View::Restaurants);
        assert!(shop.state().restaurants.is_empty());
        assert_eq!(
            shop.state().alert.as_ref().map(|a| a.message.as_str()),
            Some(MSG_RESTAURANTS_FAILED)
        );
    }

    #[test]
    fn rejected_credential_returns_to_setup() -> Result<()> {
        let service = Service {
            reject_key: true,
            ..Service::default()
        };
        let sheet = Sheet::default();
        let mut shop = Shop::new(&service, &sheet, keyed_storage(), None);
        shop.start();
        assert_eq!(shop.state().view, View::ApiKeySetup);
        assert!(!shop.state().has_credential());
        let stored: Option<ApiKey> = shop.storage().load(API_KEY_KEY)?;
        assert!(stored.is_none());
        Ok(())
    }

    #[test]
    fn menu_failure_shows_fallback_menu() {
        let service = Service {
            no_menu: true,
            ..Service::default()
        };
        let sheet = Sheet::default();
        let mut shop = Shop::new(&service, &sheet, keyed_storage(), None);
        shop.start();
        shop.dispatch(Action::SelectRestaurant("r1".into()));

        let state = shop.state();
        assert_eq!(state.view, View::Menu);
        assert_eq!(
            state.menu,
            menu::fallback::menu_for("美式漢堡", "漢堡王國")
        );
        assert_eq!(
            state.alert.as_ref().map(|a| a.message.as_str()),
            Some(MSG_MENU_FALLBACK)
        );
    }

    #[test]
    fn unknown_restaurant_goes_back_to_list() {
        let service = Service::default();
        let sheet = Sheet::default();
        let mut shop = Shop::new(&service, &sheet, keyed_storage(), None);
        shop.start();
        shop.dispatch(Action::SelectRestaurant("nope".into()));
        assert_eq!(shop.state().view, View::Restaurants);
        assert!(shop.state().selected.is_none());
        assert_eq!(*service.calls.borrow(), vec!["restaurants"]);
    }

    #[test]
    fn back_follows_the_view_graph() {
        let service = Service::default();
        let sheet = Sheet::default();
        let mut shop = Shop::new(&service, &sheet, keyed_storage(), None);
        shop.start();

        shop.dispatch(Action::ShowCart);
        shop.dispatch(Action::Back);
        assert_eq!(shop.state().view, View::Restaurants);

        shop.dispatch(Action::SelectRestaurant("r1".into()));
        shop.dispatch(Action::ShowCart);
        shop.dispatch(Action::Back);
        assert_eq!(shop.state().view, View::Menu);

        shop.dispatch(Action::Back);
        assert_eq!(shop.state().view, View::Restaurants);
        assert!(shop.state().selected.is_none());
    }

    #[test]
    fn cart_mutations_are_persisted() -> Result<()> {
        let service = Service::default();
        let sheet = Sheet::default();
        let mut shop = Shop::new(&service, &sheet, keyed_storage(), None);
        shop.start();
        shop.dispatch(Action::SelectRestaurant("r1".into()));
        shop.dispatch(Action::AddToCart("m1".into()));
        shop.dispatch(Action::Increment("m1".into()));

        let stored = Cart::load(shop.storage())?;
        assert_eq!(stored.get("m1").map(|row| row.quantity), Some(2));

        shop.dispatch(Action::SetQuantity("m1".into(), 0));
        assert!(Cart::load(shop.storage())?.is_empty());
        Ok(())
    }

    #[test]
    fn checkout_refused_for_empty_cart() {
        let service = Service::default();
        let sheet = Sheet::default();
        let mut shop = Shop::new(&service, &sheet, keyed_storage(), None);
        shop.start();
        shop.dispatch(Action::ShowCart);
        shop.dispatch(Action::Checkout);
        assert_eq!(shop.state().view, View::Cart);
        assert_eq!(
            shop.state().alert.as_ref().map(|a| a.message.as_str()),
            Some(MSG_EMPTY_CART)
        );
    }

    #[test]
    fn successful_order_confirms_and_clears_cart() -> Result<()> {
        let service = Service::default();
        let sheet = Sheet::default();
        let mut shop = at_checkout(&service, &sheet);

        shop.dispatch(Action::SubmitOrder(details()));

        let state = shop.state();
        assert_eq!(state.view, View::Confirmation);
        assert!(state.cart.is_empty());
        let order = state.order.as_ref().expect("confirmed order");
        assert_eq!(order.order_number, "ORD-246810");
        assert_eq!(order.subtotal, 360.0);
        assert_eq!(order.total, 390.0);
        assert_eq!(sheet.saved.borrow().len(), 1);
        assert!(Cart::load(shop.storage())?.is_empty());
        Ok(())
    }

    #[test]
    fn order_number_failure_still_confirms() {
        let service = Service {
            no_numbers: true,
            ..Service::default()
        };
        let sheet = Sheet::default();
        let mut shop = at_checkout(&service, &sheet);
        shop.dispatch(Action::SubmitOrder(details()));

        let order = shop.state().order.as_ref().expect("confirmed order");
        assert!(order.order_number.starts_with("ORD-"));
        assert_eq!(order.estimated_delivery_time, "20-30 分鐘");
    }

    #[test]
    fn refused_save_keeps_cart_and_view() -> Result<()> {
        let service = Service::default();
        let sheet = Sheet {
            refuse: true,
            ..Sheet::default()
        };
        let mut shop = at_checkout(&service, &sheet);
        shop.dispatch(Action::SubmitOrder(details()));

        let state = shop.state();
        assert_eq!(state.view, View::Checkout);
        assert!(state.order.is_none());
        assert_eq!(state.cart.item_count(), 2);
        assert_eq!(
            state.alert.as_ref().map(|a| a.message.as_str()),
            Some("訂單送出失敗：試算表忙碌中")
        );
        let stored: Option<serde_json::Value> = shop.storage().load(CART_KEY)?;
        assert!(stored.is_some());
        Ok(())
    }

    #[test]
    fn blank_details_are_refused() {
        let service = Service::default();
        let sheet = Sheet::default();
        let mut shop = at_checkout(&service, &sheet);
        shop.dispatch(Action::SubmitOrder(OrderDetails::default()));
        assert_eq!(shop.state().view, View::Checkout);
        assert_eq!(
            shop.state().alert.as_ref().map(|a| a.message.as_str()),
            Some(MSG_MISSING_FIELDS)
        );
        assert!(sheet.saved.borrow().is_empty());
    }

    #[test]
    fn new_order_returns_home() {
        let service = Service::default();
        let sheet = Sheet::default();
        let mut shop = at_checkout(&service, &sheet);
        shop.dispatch(Action::SubmitOrder(details()));
        shop.dispatch(Action::NewOrder);

        let state = shop.state();
        assert_eq!(state.view, View::Restaurants);
        assert!(state.selected.is_none());
        assert!(state.menu.is_empty());
        assert!(state.alert.is_none());
    }

    #[test]
    fn corrupt_stored_cart_is_discarded() -> Result<()> {
        let storage = keyed_storage();
        storage.save_raw(CART_KEY, "{not json")?;
        let service = Service::default();
        let sheet = Sheet::default();
        let shop = Shop::new(&service, &sheet, storage, None);
        assert!(shop.state().cart.is_empty());
        Ok(())
    }
}
