//! Text screens for each view and the line commands that drive them.

use std::fmt::Write as _;
use std::io::{BufRead, Write};
use std::time::Instant;

use anyhow::{Context, Result};
use err_derive::Error;
use log::*;

use infra::persistence::Storage;

use crate::cart::{Cart, SHIPPING_FEE};
use crate::menu::{FindRestaurants, GenerateMenu};
use crate::orders::{AssignOrderNumber, OrderDetails, SaveOrder, PAYMENT_METHODS};
use crate::services::{Commandable, Queryable};
use crate::shop::{Action, Shop, ShopState, View};

pub const TITLE: &str = "Gemini 美食外送";

const HELP: &str = "\
指令：
  <編號>        選擇餐廳 / 加入餐點
  c, cart       查看購物車
  b, back       返回
  home          回到餐廳列表
  refresh       重新產生餐廳
  + <編號>      數量加一      - <編號>  數量減一
  set <編號> <數量>           rm <編號> 移除
  checkout      前往結帳      order     填寫訂單
  key           更換 API 金鑰
  x             關閉通知
  q, quit       離開";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error(display = "unknown command: {:?}", _0)]
    Unknown(String),
    #[error(display = "not a number: {:?}", _0)]
    BadNumber(String),
    #[error(display = "no entry numbered {}", _0)]
    NoSuchEntry(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Dispatch(Action),
    /// Collect customer details, then submit.
    FillOrder,
    Help,
    Quit,
    Nothing,
}

pub fn price(amount: f64) -> String {
    format!("NT${}", amount)
}

fn header(state: &ShopState) -> String {
    format!("== {} ==  🛒 {}", TITLE, state.cart.item_count())
}

/// Renders the current view, including any live alert.
pub fn render(state: &ShopState, now: Instant) -> String {
    let mut out = header(state);
    out.push('\n');
    if let Some(alert) = state.alert_at(now) {
        let _ = writeln!(out, "{}", alert);
    }
    out.push('\n');
    match state.view {
        View::ApiKeySetup => render_setup(&mut out),
        View::Restaurants => render_restaurants(state, &mut out),
        View::Menu => render_menu(state, &mut out),
        View::Cart => render_cart(&state.cart, &mut out),
        View::Checkout => render_checkout(&state.cart, &mut out),
        View::Confirmation => render_confirmation(state, &mut out),
    }
    out
}

fn render_setup(out: &mut String) {
    out.push_str("請輸入您的 Gemini API 金鑰以開始使用。\n");
    out.push_str("金鑰只會儲存在這台電腦上。\n");
}

fn render_restaurants(state: &ShopState, out: &mut String) {
    if state.restaurants.is_empty() {
        out.push_str("目前沒有餐廳。輸入 refresh 重新產生。\n");
        return;
    }
    out.push_str("附近的餐廳\n");
    for (n, r) in state.restaurants.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>2}. {} [{}]\n    {} {:.1} ({} 則評論) · {} · 最低消費 {}",
            n + 1,
            r.name,
            r.category,
            r.stars(),
            r.rating,
            r.reviews,
            r.delivery_time,
            price(f64::from(r.min_order))
        );
    }
}

fn render_menu(state: &ShopState, out: &mut String) {
    if let Some(r) = state.selected.as_ref() {
        let _ = writeln!(out, "{} 的菜單", r.name);
    }
    for (n, item) in state.menu.iter().enumerate() {
        let in_cart = state
            .cart
            .get(&item.id)
            .map(|row| format!("  (購物車 x{})", row.quantity))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "{:>2}. {}  {}{}",
            n + 1,
            item.name,
            price(item.price),
            in_cart
        );
    }
}

fn render_totals(cart: &Cart, out: &mut String) {
    let _ = writeln!(out, "小計    {}", price(cart.subtotal()));
    let _ = writeln!(out, "外送費  {}", price(SHIPPING_FEE));
    let _ = writeln!(out, "總計    {}", price(cart.total()));
}

fn render_cart(cart: &Cart, out: &mut String) {
    if cart.is_empty() {
        out.push_str("您的購物車是空的。\n");
        return;
    }
    out.push_str("購物車\n");
    for (n, row) in cart.items().iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>2}. {} ({})  {} x {} = {}",
            n + 1,
            row.item.name,
            row.item.restaurant_name,
            price(row.item.price),
            row.quantity,
            price(row.line_total())
        );
    }
    render_totals(cart, out);
}

/// The cart screen on its own, without header or alert.
pub fn cart_screen(cart: &Cart) -> String {
    let mut out = String::new();
    render_cart(cart, &mut out);
    out
}

fn render_checkout(cart: &Cart, out: &mut String) {
    out.push_str("結帳\n");
    for row in cart.items() {
        let _ = writeln!(out, "  {}  {}", row.summary(), price(row.line_total()));
    }
    render_totals(cart, out);
    out.push_str("輸入 order 填寫外送資料並送出訂單。\n");
}

fn render_confirmation(state: &ShopState, out: &mut String) {
    let order = match state.order.as_ref() {
        Some(order) => order,
        None => return,
    };
    out.push_str("訂單已確認！\n");
    let _ = writeln!(out, "訂單編號：{}", order.order_number);
    let _ = writeln!(out, "預計送達時間：{}", order.estimated_delivery_time);
    let _ = writeln!(out, "收件人：{}", order.details.customer_name);
    let _ = writeln!(out, "外送地址：{}", order.details.delivery_address);
    let _ = writeln!(out, "付款方式：{}", order.details.payment_method);
    let _ = writeln!(out, "品項：{}", order.item_summary());
    let _ = writeln!(out, "總計：{}", price(order.total));
    out.push_str("輸入 home 開始新的訂單。\n");
}

fn nth<'a, T, F>(items: &'a [T], arg: &str, id: F) -> Result<String, ParseError>
where
    F: Fn(&'a T) -> &'a str,
{
    let n: usize = arg
        .parse()
        .map_err(|_| ParseError::BadNumber(arg.to_string()))?;
    n.checked_sub(1)
        .and_then(|i| items.get(i))
        .map(|item| id(item).to_string())
        .ok_or(ParseError::NoSuchEntry(n))
}

fn cart_id(state: &ShopState, arg: Option<&str>) -> Result<String, ParseError> {
    nth(state.cart.items(), arg.unwrap_or(""), |row| row.id())
}

/// Interprets one input line in the context of the current view.
pub fn parse(state: &ShopState, line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Nothing);
    }
    if state.view == View::ApiKeySetup {
        return Ok(match line {
            "q" | "quit" => Command::Quit,
            "h" | "help" => Command::Help,
            key => Command::Dispatch(Action::SubmitCredential(key.to_string())),
        });
    }

    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or("");
    let arg = words.next();
    let action = match verb {
        "q" | "quit" => return Ok(Command::Quit),
        "h" | "help" => return Ok(Command::Help),
        "order" if state.view == View::Checkout => return Ok(Command::FillOrder),
        "c" | "cart" => Action::ShowCart,
        "b" | "back" => Action::Back,
        "home" | "new" => Action::NewOrder,
        "refresh" => Action::RefreshRestaurants,
        "checkout" => Action::Checkout,
        "key" => Action::ForgetCredential,
        "x" => Action::DismissAlert,
        "+" => Action::Increment(cart_id(state, arg)?),
        "-" => Action::Decrement(cart_id(state, arg)?),
        "rm" => Action::RemoveFromCart(cart_id(state, arg)?),
        "set" => {
            let id = cart_id(state, arg)?;
            let qty = words.next().unwrap_or("");
            let qty: i64 = qty
                .parse()
                .map_err(|_| ParseError::BadNumber(qty.to_string()))?;
            Action::SetQuantity(id, qty)
        }
        n if n.chars().all(|c| c.is_ascii_digit()) => match state.view {
            View::Restaurants => {
                Action::SelectRestaurant(nth(&state.restaurants[..], n, |r| r.id.as_str())?)
            }
            View::Menu => Action::AddToCart(nth(&state.menu[..], n, |item| item.id.as_str())?),
            _ => return Err(ParseError::Unknown(line.to_string())),
        },
        _ => return Err(ParseError::Unknown(line.to_string())),
    };
    Ok(Command::Dispatch(action))
}

fn prompt<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    label: &str,
) -> Result<Option<String>> {
    write!(output, "{}：", label)?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line).context("read input")? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Asks for the checkout form fields. `None` when input ends early.
pub fn read_details<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
) -> Result<Option<OrderDetails>> {
    macro_rules! field {
        ($label:expr) => {
            match prompt(input, output, $label)? {
                Some(value) => value,
                None => return Ok(None),
            }
        };
    }

    let customer_name = field!("姓名");
    let customer_phone = field!("電話");
    let delivery_address = field!("外送地址");
    for (n, method) in PAYMENT_METHODS.iter().enumerate() {
        writeln!(output, "  {}. {}", n + 1, method)?;
    }
    let choice = field!("付款方式");
    let payment_method = choice
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| PAYMENT_METHODS.get(i))
        .map(|m| m.to_string())
        .unwrap_or(choice);
    let notes = field!("備註（選填）");

    Ok(Some(OrderDetails {
        customer_name,
        customer_phone,
        delivery_address,
        payment_method,
        order_notes: Some(notes).filter(|n| !n.is_empty()),
    }))
}

/// Runs the interactive session until `quit` or end of input.
pub fn run<G, S, St, R, W>(
    shop: &mut Shop<G, S, St>,
    input: &mut R,
    output: &mut W,
) -> Result<()>
where
    G: Queryable<FindRestaurants> + Queryable<GenerateMenu> + Queryable<AssignOrderNumber>,
    S: Commandable<SaveOrder>,
    St: Storage,
    R: BufRead,
    W: Write,
{
    shop.start();
    loop {
        write!(output, "\n{}\n> ", render(shop.state(), Instant::now()))?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line).context("read input")? == 0 {
            break;
        }
        let command = match parse(shop.state(), &line) {
            Ok(command) => command,
            Err(e) => {
                debug!("Unparseable input: {}", e);
                writeln!(output, "無法辨識的指令，輸入 help 查看說明。")?;
                continue;
            }
        };
        match command {
            Command::Quit => break,
            Command::Nothing => {}
            Command::Help => writeln!(output, "{}", HELP)?,
            Command::Dispatch(action) => shop.dispatch(action),
            Command::FillOrder => match read_details(input, output)? {
                Some(details) => shop.dispatch(Action::SubmitOrder(details)),
                None => break,
            },
        }
    }
    info!("Session ended");
    Ok(())
}
