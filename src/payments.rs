//! Платёжный контур: полезная нагрузка, шлюзы, зачисление.

#[path = "payments/cryptobot.rs"]
pub mod cryptobot;
#[path = "payments/fulfill.rs"]
pub mod fulfill;
#[path = "payments/payload.rs"]
pub mod payload;
#[path = "payments/platega.rs"]
pub mod platega;
