pub mod clock;
pub mod config;
pub mod duration;
pub mod scraper;
pub mod tangerine;
