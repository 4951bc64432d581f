pub mod events;
pub mod survival;
pub mod estimation;
pub mod combine;
