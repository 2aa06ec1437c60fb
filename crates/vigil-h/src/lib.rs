//! Headless Chromium engine over the DevTools protocol.

pub mod cdp;
pub mod page;

pub use cdp::{CdpContext, CdpEngine, CdpLauncher};
pub use page::CdpPage;
