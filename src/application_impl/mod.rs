mod auth_service_impl;
mod chat_service_impl;
mod media;

pub use auth_service_impl::*;
pub use chat_service_impl::*;
pub use media::*;

#[cfg(test)]
mod chat_service_tests;
