use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::time::Duration;

use crate::models::job::AppStore;

/// One raw screenshot as returned by a source.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub data: Vec<u8>,
    /// File extension without the dot, e.g. `png`.
    pub extension: &'static str,
}

/// Where screenshots come from. A real implementation would scrape the store
/// listing or call a store API.
#[async_trait]
pub trait ScreenshotSource: Send + Sync {
    /// Ordered screenshots for one app.
    async fn fetch(&self, store: AppStore, app_id: &str) -> Result<Vec<Screenshot>, SourceError>;
}

/// Renders deterministic placeholder PNGs instead of contacting a store.
pub struct PlaceholderSource {
    count: usize,
    latency: Duration,
}

impl PlaceholderSource {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            latency: Duration::ZERO,
        }
    }

    /// Sleep this long before every screenshot, to mimic network time.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

fn canvas_size(store: AppStore) -> (u32, u32) {
    match store {
        AppStore::Google => (180, 320),
        AppStore::Apple => (195, 422),
    }
}

/// Stable base color for an app, so repeated runs produce identical images.
fn base_color(app_id: &str) -> Rgb<u8> {
    let hash = app_id
        .bytes()
        .fold(0x811c_9dc5_u32, |h, b| (h ^ u32::from(b)).wrapping_mul(0x0100_0193));
    let [r, g, b, _] = hash.to_be_bytes();
    Rgb([r, g, b])
}

fn render_placeholder(store: AppStore, app_id: &str, index: usize) -> Result<Vec<u8>, SourceError> {
    let (width, height) = canvas_size(store);
    let Rgb([r, g, b]) = base_color(app_id);
    let band = height / 8;
    // Each screenshot shifts its header band so the images are distinguishable.
    let band_top = (index as u32 * band) % (height - band);

    let img = RgbImage::from_fn(width, height, |x, y| {
        if y >= band_top && y < band_top + band {
            Rgb([255 - r, 255 - g, 255 - b])
        } else {
            let shade = (x * 64 / width) as u8;
            Rgb([r.saturating_add(shade), g, b.saturating_add(shade)])
        }
    });

    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| SourceError::Render(e.to_string()))?;
    Ok(buf.into_inner())
}

#[async_trait]
impl ScreenshotSource for PlaceholderSource {
    async fn fetch(&self, store: AppStore, app_id: &str) -> Result<Vec<Screenshot>, SourceError> {
        if app_id.trim().is_empty() {
            return Err(SourceError::AppNotFound(app_id.to_string()));
        }

        let mut shots = Vec::with_capacity(self.count);
        for index in 0..self.count {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            shots.push(Screenshot {
                data: render_placeholder(store, app_id, index)?,
                extension: "png",
            });
        }
        Ok(shots)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("App {0} not found in store")]
    AppNotFound(String),

    #[error("Store request failed: {0}")]
    Upstream(String),

    #[error("Failed to render screenshot: {0}")]
    Render(String),
}
