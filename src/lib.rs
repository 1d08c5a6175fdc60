//! Client side of the DialSmart phone recommendation chat.
//!
//! [`widget::ChatWidget`] owns the chat window state and talks to the backend
//! through a [`client::ChatApi`]. Replies are rendered into an HTML
//! [`transcript::Transcript`] by the pure functions in [`render`].

pub mod client;
pub mod compare;
pub mod error;
pub mod models;
pub mod render;
pub mod session;
pub mod settings;
pub mod transcript;
pub mod widget;

pub use client::{ChatApi, HttpChatApi};
pub use error::{ChatError, FailureKind};
pub use widget::ChatWidget;
