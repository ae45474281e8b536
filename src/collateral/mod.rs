pub mod issuer;
pub mod vault;

pub use issuer::CollateralTokenIssuer;
pub use vault::{CollateralVault, InvoicePosition};
