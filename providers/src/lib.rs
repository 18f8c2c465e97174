//! Adapters for the enrollment engine's outbound ports.
//!
//! - [`StripeGateway`]: [`PaymentGateway`](enrollment_core::gateway::PaymentGateway)
//!   over the Stripe REST API, including webhook signature verification
//! - [`SmtpNotificationSender`]: SMTP delivery via `lettre`
//! - [`ConsoleNotificationSender`]: logs messages instead of sending them
//!
//! Both senders render messages through [`render`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod console;
pub mod signature;
mod smtp;
mod stripe;
mod template;

pub use console::ConsoleNotificationSender;
pub use smtp::{SmtpConfig, SmtpNotificationSender};
pub use stripe::{StripeConfig, StripeGateway};
pub use template::{RenderedEmail, render};
