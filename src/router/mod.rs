//! Request routing
//!
//! Decides where each command runs and executes it there. Every node owns a
//! [`Router`]; the role fixes its [`RoutingRule`]:
//!
//! ```text
//!                 ┌──────────────┐
//!   *.c, *.h ...  │ coordinator  │  local store (./smain)
//!   ─────────────▶│ ByExtension  │
//!                 └──────┬───────┘
//!              *.txt     │     *.pdf
//!           ┌────────────┴────────────┐
//!           ▼                         ▼
//!   ┌──────────────┐          ┌──────────────┐
//!   │  text store  │          │  pdf store   │
//!   │  LocalOnly   │          │  LocalOnly   │
//!   └──────────────┘          └──────────────┘
//! ```

pub mod dispatch;
pub mod rules;

pub use dispatch::Router;
pub use rules::{extension_of, Backend, ByExtension, LocalOnly, RoutingRule, Target};
