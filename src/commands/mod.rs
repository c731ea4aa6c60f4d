pub mod classify;
pub mod history;
pub mod serve;
