//! Image identity handling
//!
//! This module turns raw `repository[:tag]` lines into immutable
//! [`ImageReference`] values, maps them onto the destination registry with
//! [`DestinationMapping`], and provides manifest digest helpers.

pub mod digest;
pub mod list;
pub mod reference;

pub use digest::{DigestUtils, PENDING_DIGEST};
pub use list::{dedupe_images, load_image_list, parse_image_list};
pub use reference::{DEFAULT_TAG, DestinationMapping, ImageReference};
