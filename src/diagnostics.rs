//! Numbered checkpoint screenshots for post-mortem debugging.

use std::path::PathBuf;

use tokio::fs;

use crate::driver::PageDriver;
use crate::logging::RunLogger;

/// Writes `NN_name.png` files, one per reached checkpoint, in capture order.
///
/// Capture is strictly best-effort: a failed screenshot is a warning, never
/// a reason to abort the run that needed the diagnostic in the first place.
#[derive(Debug)]
pub struct ScreenshotLog {
    dir: PathBuf,
    counter: u32,
    announce: bool,
}

impl ScreenshotLog {
    pub fn new(dir: impl Into<PathBuf>, announce: bool) -> Self {
        Self {
            dir: dir.into(),
            counter: 0,
            announce,
        }
    }

    pub fn captured(&self) -> u32 {
        self.counter
    }

    pub async fn capture<D>(&mut self, driver: &D, logger: &RunLogger, name: &str)
    where
        D: PageDriver + ?Sized,
    {
        self.counter += 1;
        let filename = format!("{:02}_{}.png", self.counter, name);
        let path = self.dir.join(&filename);

        let image = match driver.screenshot().await {
            Ok(image) => image,
            Err(err) => {
                logger.warn(
                    format!("screenshot '{name}' failed: {err}"),
                    Some("diagnostics"),
                );
                return;
            }
        };

        if let Err(err) = fs::write(&path, &image).await {
            logger.warn(
                format!("could not write {}: {err}", path.display()),
                Some("diagnostics"),
            );
            return;
        }

        if self.announce {
            logger.debug(format!("Screenshot saved: {filename}"), Some("diagnostics"));
        }
    }
}
