//! Телеграм-слой: обработчики, клавиатуры и тексты.

pub mod handlers;
pub mod keyboards;
pub mod texts;
