//! Guarded with `#[cfg(test)]` from `lib.rs`
