pub mod breakers;
pub mod content;
pub mod health;
pub mod jobs;
pub mod results;
pub mod uploads;
