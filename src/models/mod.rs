mod checkout_session;
mod coupon;
mod order;
mod product;

pub use checkout_session::*;
pub use coupon::*;
pub use order::*;
pub use product::*;
