//! Fetching files from the `res/` directory.
//!
//! On the desktop `build.rs` copies `res/` next to the build output and files
//! are read from there; in the browser they are fetched relative to the page.

#[cfg(not(target_arch = "wasm32"))]
use std::io::Read;

/// How much of a file has arrived so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadProgress {
    pub loaded: u64,
    pub total: Option<u64>,
}

impl LoadProgress {
    /// `loaded / total`, when the total size is known.
    pub fn fraction(&self) -> Option<f32> {
        match self.total {
            Some(0) => Some(1.0),
            Some(total) => Some((self.loaded as f64 / total as f64).min(1.0) as f32),
            None => None,
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn format_url(file_name: &str) -> anyhow::Result<reqwest::Url> {
    let window = web_sys::window().ok_or_else(|| anyhow::anyhow!("no window object available"))?;
    let location = window.location();
    let origin = location
        .origin()
        .map_err(|e| anyhow::anyhow!("unable to read page origin: {:?}", e))?;
    let pathname = location
        .pathname()
        .map_err(|e| anyhow::anyhow!("unable to read page path: {:?}", e))?;

    // Resolve against the page's directory, not the page itself
    let directory = match pathname.rfind('/') {
        Some(slash) => &pathname[..=slash],
        None => "/",
    };
    let base = reqwest::Url::parse(&format!("{}{}res/", origin, directory))?;
    Ok(base.join(file_name)?)
}

#[cfg(not(target_arch = "wasm32"))]
fn resource_path(file_name: &str) -> std::path::PathBuf {
    std::path::Path::new(env!("OUT_DIR"))
        .join("res")
        .join(file_name)
}

pub async fn load_string(file_name: &str) -> anyhow::Result<String> {
    #[cfg(target_arch = "wasm32")]
    let txt = {
        let url = format_url(file_name)?;
        reqwest::get(url).await?.error_for_status()?.text().await?
    };
    #[cfg(not(target_arch = "wasm32"))]
    let txt = std::fs::read_to_string(resource_path(file_name))?;

    Ok(txt)
}

pub async fn load_binary(file_name: &str) -> anyhow::Result<Vec<u8>> {
    load_binary_with_progress(file_name, |_| {}).await
}

pub async fn load_binary_with_progress(
    file_name: &str,
    mut on_progress: impl FnMut(LoadProgress),
) -> anyhow::Result<Vec<u8>> {
    #[cfg(target_arch = "wasm32")]
    let data = {
        let url = format_url(file_name)?;
        let response = reqwest::get(url).await?.error_for_status()?;
        let total = response.content_length();
        let data = response.bytes().await?.to_vec();
        on_progress(LoadProgress {
            loaded: data.len() as u64,
            total,
        });
        data
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = {
        const CHUNK: usize = 64 * 1024;

        let mut file = std::fs::File::open(resource_path(file_name))?;
        let total = file.metadata()?.len();
        let mut data = Vec::with_capacity(total as usize);
        let mut chunk = vec![0u8; CHUNK];
        loop {
            let read = file.read(&mut chunk)?;
            if read == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..read]);
            on_progress(LoadProgress {
                loaded: data.len() as u64,
                total: Some(total),
            });
        }
        data
    };

    Ok(data)
}
