pub mod backers;
pub mod creators;
pub mod health;
pub mod projects;
pub mod search;
