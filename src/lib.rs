//! Channel compositing: build an image whose red, green, blue and alpha
//! channels are each copied from a selected channel of a separate source
//! image, falling back to the destination's own value where no source is
//! loaded.
//!
//! ```no_run
//! use rgbcompositor::{CancelToken, ChannelSelector, Compositor, CompositorConfig, TileScheduler};
//!
//! let mut dst = rgbcompositor::io::load_surface("base.png".as_ref()).unwrap();
//! let mut cfg = CompositorConfig::default();
//! cfg.alpha.path = "mask.png".into();
//! cfg.alpha.channel = ChannelSelector::Red;
//!
//! let mut compositor = Compositor::new();
//! compositor.configure(&cfg, dst.dimensions());
//! TileScheduler::default().render(&compositor, &mut dst, &CancelToken::new());
//! ```

#[macro_use]
pub mod logger;

pub mod canvas;
pub mod cli;
pub mod compositor;
pub mod config;
pub mod io;
pub mod pixel;
pub mod render;

pub use canvas::{PixelSurface, Rect, Surface, SurfaceBand};
pub use compositor::{Compositor, LifecycleStats, SlotRole, SlotStatus, SourceSlot, load_slot};
pub use config::{CompositorConfig, SlotConfig};
pub use io::{DecodeError, ImageFileDecoder, SourceDecoder};
pub use pixel::{ChannelSelector, ColorBgra, extract_channel};
pub use render::{CancelToken, TileScheduler, split_into_tiles};
