pub mod apk;
pub mod badging;
pub mod command;
pub mod devices;
pub mod locator;
pub mod observer;
pub mod parse;
pub mod resolver;
pub mod runner;
pub mod scrcpy;
