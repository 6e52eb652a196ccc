pub mod formatter;
pub mod keyboard;
pub mod messenger;
pub mod telegram;
