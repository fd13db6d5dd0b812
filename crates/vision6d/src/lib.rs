#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use vision6d_image as image;

#[doc(inline)]
pub use vision6d_3d as k3d;

#[doc(inline)]
pub use vision6d_pnp as pnp;

#[doc(inline)]
pub use vision6d_registration as registration;
