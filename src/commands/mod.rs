pub mod check_size;
pub mod extract;
pub mod legend;
pub mod tags;
pub mod utils;
pub mod wait_stable;

#[cfg(test)]
#[path = "../commands_test.rs"]
mod commands_test;
