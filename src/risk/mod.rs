pub mod filters;
pub mod kelly;
pub mod stop_loss;
