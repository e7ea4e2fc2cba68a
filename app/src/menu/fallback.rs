//! Fixed menus served when menu generation is unavailable.

use super::models::MenuItem;

type Dish = (&'static str, &'static str, f64);

pub const DEFAULT_CATEGORY: &str = "現代美式料理";

/// Checked in order; the first key whose leading two characters appear in
/// the restaurant's category wins.
const MENUS: &[(&str, [Dish; 6])] = &[
    (
        "現代美式料理",
        [
            ("m1", "經典漢堡", 180.0),
            ("m2", "起司漢堡", 200.0),
            ("m3", "薯條", 80.0),
            ("m4", "奶昔", 120.0),
            ("m5", "洋蔥圈", 90.0),
            ("m6", "招牌沙拉", 150.0),
        ],
    ),
    (
        "日式料理",
        [
            ("j1", "綜合壽司拼盤", 320.0),
            ("j2", "鮭魚生魚片", 280.0),
            ("j3", "天婦羅烏龍麵", 220.0),
            ("j4", "照燒雞肉飯", 180.0),
            ("j5", "味噌湯", 60.0),
            ("j6", "日式煎餃", 120.0),
        ],
    ),
    (
        "義式料理",
        [
            ("i1", "瑪格麗特披薩", 280.0),
            ("i2", "培根蛋奶義大利麵", 240.0),
            ("i3", "凱薩沙拉", 160.0),
            ("i4", "蒜香麵包", 80.0),
            ("i5", "提拉米蘇", 120.0),
            ("i6", "義式濃縮咖啡", 60.0),
        ],
    ),
    (
        "墨西哥料理",
        [
            ("x1", "牛肉塔可", 120.0),
            ("x2", "雞肉捲餅", 160.0),
            ("x3", "酪梨醬", 80.0),
            ("x4", "墨西哥玉米片", 100.0),
            ("x5", "莎莎醬", 60.0),
            ("x6", "墨西哥汽水", 50.0),
        ],
    ),
    (
        "中式料理",
        [
            ("c1", "麻婆豆腐", 180.0),
            ("c2", "宮保雞丁", 220.0),
            ("c3", "酸辣湯", 80.0),
            ("c4", "炒飯", 120.0),
            ("c5", "小籠包", 150.0),
            ("c6", "春捲", 90.0),
        ],
    ),
    (
        "甜點",
        [
            ("d1", "法式千層派", 150.0),
            ("d2", "熔岩巧克力蛋糕", 180.0),
            ("d3", "起司蛋糕", 120.0),
            ("d4", "馬卡龍", 60.0),
            ("d5", "水果塔", 140.0),
            ("d6", "冰淇淋", 90.0),
        ],
    ),
    (
        "泰式料理",
        [
            ("t1", "綠咖哩雞", 250.0),
            ("t2", "泰式炒河粉", 220.0),
            ("t3", "冬蔭功湯", 180.0),
            ("t4", "月亮蝦餅", 280.0),
            ("t5", "泰式奶茶", 80.0),
            ("t6", "摩摩喳喳", 100.0),
        ],
    ),
    (
        "素食",
        [
            ("v1", "未來肉漢堡", 250.0),
            ("v2", "藜麥沙拉碗", 220.0),
            ("v3", "素食炒飯", 150.0),
            ("v4", "蔬菜天婦羅", 180.0),
            ("v5", "南瓜濃湯", 100.0),
            ("v6", "酪梨吐司", 160.0),
        ],
    ),
];

fn key_prefix(key: &str) -> &str {
    match key.char_indices().nth(2) {
        Some((idx, _)) => &key[..idx],
        None => key,
    }
}

/// The fallback key that `category` selects.
pub fn key_for(category: &str) -> &'static str {
    MENUS
        .iter()
        .map(|(key, _)| *key)
        .find(|key| category.contains(key_prefix(key)))
        .unwrap_or(DEFAULT_CATEGORY)
}

pub fn menu_for(category: &str, restaurant_name: &str) -> Vec<MenuItem> {
    let key = key_for(category);
    let dishes = MENUS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, dishes)| dishes)
        .unwrap_or(&MENUS[0].1);

    dishes
        .iter()
        .map(|&(id, name, price)| MenuItem::new(id, name, price, restaurant_name))
        .collect()
}
