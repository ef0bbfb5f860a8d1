//! Client-side state containers.

pub mod wishlist;

pub use wishlist::{ClientError, OptimisticWishlist, RemoteError, ServiceRemote, WishlistRemote};
