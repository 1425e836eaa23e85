//! Upload pipeline: display handles for the selected file and its volume analysis.
//!
//! Selecting a file releases the handle of the previous one, resets the quote, and
//! issues one analyze call. Uploads are never cancelled. A newer upload simply makes
//! the older call's token stale, so its analysis can't reach the new session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::api::{AnalyzeResponse, FileUpload};
use crate::error::{ApiError, HandleError};
use crate::quote::QuoteMachine;
use crate::token::{Resolution, SequenceToken, TokenSource};

/// Identity of one displayed model. A fresh one is minted per selected file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelId(Uuid);

impl ModelId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ModelId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Short-lived reference to in-memory file bytes. Not `Clone`: it is handed back to
/// its [`HandleStore`] exactly once.
#[derive(Debug, PartialEq, Eq)]
pub struct DisplayHandle {
    id: ModelId,
    locator: String,
}

impl DisplayHandle {
    pub fn new(id: ModelId, locator: String) -> Self {
        Self { id, locator }
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    /// Where the renderer or browser can reach the bytes (`blob:` URL on the web).
    pub fn locator(&self) -> &str {
        &self.locator
    }
}

pub trait HandleStore {
    fn allocate(&mut self, file: &FileUpload) -> Result<DisplayHandle, HandleError>;
    fn release(&mut self, handle: DisplayHandle);
}

/// Keeps the bytes in a map keyed by model id.
#[derive(Debug, Default)]
pub struct MemoryHandles {
    live: HashMap<ModelId, Arc<[u8]>>,
    released: usize,
}

impl MemoryHandles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live(&self) -> usize {
        self.live.len()
    }

    pub fn released(&self) -> usize {
        self.released
    }

    pub fn bytes(&self, id: ModelId) -> Option<Arc<[u8]>> {
        self.live.get(&id).cloned()
    }
}

impl HandleStore for MemoryHandles {
    fn allocate(&mut self, file: &FileUpload) -> Result<DisplayHandle, HandleError> {
        let id = ModelId::new();
        self.live.insert(id, Arc::clone(&file.bytes));
        Ok(DisplayHandle::new(id, format!("mem://{id}/{}", file.name)))
    }

    fn release(&mut self, handle: DisplayHandle) {
        if self.live.remove(&handle.id).is_some() {
            self.released += 1;
        } else {
            log::warn!("released unknown display handle {}", handle.locator);
        }
    }
}

/// Browser object URLs (`URL.createObjectURL`) over a `Blob` of the file.
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Default)]
pub struct ObjectUrlHandles;

#[cfg(target_arch = "wasm32")]
impl HandleStore for ObjectUrlHandles {
    fn allocate(&mut self, file: &FileUpload) -> Result<DisplayHandle, HandleError> {
        let array = js_sys::Uint8Array::from(&file.bytes[..]);
        let parts = js_sys::Array::of1(&array);
        let options = web_sys::BlobPropertyBag::new();
        options.set_type("model/stl");
        let blob = web_sys::Blob::new_with_u8_array_sequence_and_options(&parts, &options)
            .map_err(|e| HandleError(format!("{e:?}")))?;
        let url = web_sys::Url::create_object_url_with_blob(&blob)
            .map_err(|e| HandleError(format!("{e:?}")))?;
        Ok(DisplayHandle::new(ModelId::new(), url))
    }

    fn release(&mut self, handle: DisplayHandle) {
        if let Err(e) = web_sys::Url::revoke_object_url(&handle.locator) {
            log::warn!("could not revoke {}: {e:?}", handle.locator);
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub type PlatformHandles = ObjectUrlHandles;
#[cfg(not(target_arch = "wasm32"))]
pub type PlatformHandles = MemoryHandles;

/// The file of the current session together with its display handle.
#[derive(Debug)]
pub struct ModelAsset {
    handle: DisplayHandle,
    file: FileUpload,
}

impl ModelAsset {
    pub fn id(&self) -> ModelId {
        self.handle.id()
    }

    pub fn name(&self) -> &str {
        &self.file.name
    }

    pub fn locator(&self) -> &str {
        self.handle.locator()
    }

    pub fn file(&self) -> &FileUpload {
        &self.file
    }
}

/// An analyze call to issue; report it back with [`UploadPipeline::resolve`].
#[derive(Debug, Clone)]
pub struct AnalyzeCall {
    pub token: SequenceToken,
    pub model: ModelId,
    pub file: FileUpload,
}

pub struct UploadPipeline<H: HandleStore> {
    store: H,
    current: Option<ModelAsset>,
    tokens: TokenSource,
}

impl<H: HandleStore> UploadPipeline<H> {
    pub fn new(store: H) -> Self {
        Self { store, current: None, tokens: TokenSource::new() }
    }

    pub fn current(&self) -> Option<&ModelAsset> {
        self.current.as_ref()
    }

    pub fn store(&self) -> &H {
        &self.store
    }

    /// An analyze call is in flight for the current file.
    pub fn is_analyzing(&self) -> bool {
        self.tokens.in_flight()
    }

    /// Replace the session's file.
    ///
    /// Volume and quote are reset before the call is handed out, so no response that
    /// arrives afterwards can be attributed to the previous file.
    pub fn begin(&mut self, file: FileUpload, quote: &mut QuoteMachine) -> Result<AnalyzeCall, HandleError> {
        self.release_current();
        self.tokens.supersede();
        quote.reset_for_new_file();

        let handle = self.store.allocate(&file)?;
        let model = handle.id();
        log::info!("model {model}: {} ({} bytes)", file.name, file.bytes.len());
        self.current = Some(ModelAsset { handle, file: file.clone() });
        let token = self.tokens.issue();
        Ok(AnalyzeCall { token, model, file })
    }

    /// Report the outcome of an analyze call. A usable volume is fed into `quote`.
    pub fn resolve(
        &mut self,
        token: SequenceToken,
        result: Result<AnalyzeResponse, ApiError>,
        quote: &mut QuoteMachine,
        now: Duration,
    ) -> Resolution<f64, ApiError> {
        if !self.tokens.settle(token) {
            log::debug!("discarding stale analysis {token}");
            return Resolution::Stale;
        }
        match result {
            Ok(AnalyzeResponse { volume_cm3 }) if volume_cm3.is_finite() && volume_cm3 >= 0.0 => {
                log::info!("volume {volume_cm3:.2} cm³");
                quote.on_volume_known(volume_cm3, now);
                Resolution::Applied(volume_cm3)
            }
            Ok(AnalyzeResponse { volume_cm3 }) => {
                Resolution::Failed(ApiError::Decode(format!("unusable volume {volume_cm3}")))
            }
            Err(e) => {
                log::warn!("analysis failed: {e}");
                Resolution::Failed(e)
            }
        }
    }

    /// End of the configuration session: release the file and forget pending analysis.
    pub fn end_session(&mut self) {
        self.release_current();
        self.tokens.supersede();
    }

    fn release_current(&mut self) {
        if let Some(asset) = self.current.take() {
            log::debug!("releasing {}", asset.handle.locator());
            self.store.release(asset.handle);
        }
    }
}

impl<H: HandleStore> Drop for UploadPipeline<H> {
    fn drop(&mut self) {
        self.release_current();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::quote::Quote;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn file(name: &str) -> FileUpload {
        FileUpload { name: name.into(), bytes: Arc::from(name.as_bytes()) }
    }

    fn volume(v: f64) -> Result<AnalyzeResponse, ApiError> {
        Ok(AnalyzeResponse { volume_cm3: v })
    }

    #[test]
    fn begin_resets_quote_immediately() {
        let mut quote = QuoteMachine::new(ms(100));
        let mut up = UploadPipeline::new(MemoryHandles::new());
        let call = up.begin(file("a.stl"), &mut quote).unwrap();
        up.resolve(call.token, volume(50.0), &mut quote, ms(0));
        let call = quote.poll(ms(100)).unwrap();
        quote.resolve(call.token, Ok(crate::api::PriceResponse { price: 4.0, weight_g: 10.0 }));
        assert!(quote.quote().is_priced());

        up.begin(file("b.stl"), &mut quote).unwrap();
        assert_eq!(quote.volume_cm3(), None);
        assert_eq!(quote.quote(), Quote::ZERO);
        assert!(up.is_analyzing());
    }

    #[test]
    fn replacing_releases_previous_handle_once() {
        let mut quote = QuoteMachine::new(ms(100));
        let mut up = UploadPipeline::new(MemoryHandles::new());
        up.begin(file("a.stl"), &mut quote).unwrap();
        up.begin(file("b.stl"), &mut quote).unwrap();
        up.begin(file("c.stl"), &mut quote).unwrap();
        assert_eq!(up.store().live(), 1);
        assert_eq!(up.store().released(), 2);
        assert_eq!(up.current().unwrap().name(), "c.stl");

        up.end_session();
        up.end_session();
        assert_eq!(up.store().live(), 0);
        assert_eq!(up.store().released(), 3);
    }

    #[test]
    fn stale_analysis_cannot_reach_newer_file() {
        let mut quote = QuoteMachine::new(ms(100));
        let mut up = UploadPipeline::new(MemoryHandles::new());
        let a = up.begin(file("a.stl"), &mut quote).unwrap();
        let b = up.begin(file("b.stl"), &mut quote).unwrap();
        assert_ne!(a.model, b.model);

        assert_eq!(up.resolve(a.token, volume(12.0), &mut quote, ms(5)), Resolution::Stale);
        assert_eq!(quote.volume_cm3(), None);
        assert!(up.is_analyzing());

        assert_eq!(up.resolve(b.token, volume(30.0), &mut quote, ms(10)), Resolution::Applied(30.0));
        assert_eq!(quote.volume_cm3(), Some(30.0));
        assert!(!up.is_analyzing());
    }

    #[test]
    fn failed_analysis_keeps_file_and_zero_price() {
        let mut quote = QuoteMachine::new(ms(100));
        let mut up = UploadPipeline::new(MemoryHandles::new());
        let call = up.begin(file("a.stl"), &mut quote).unwrap();
        let res = up.resolve(call.token, Err(ApiError::Status { status: 500, body: "bad mesh".into() }), &mut quote, ms(0));
        assert!(matches!(res, Resolution::Failed(_)));
        assert!(up.current().is_some());
        assert!(!up.is_analyzing());
        assert!(!quote.is_computing());
        assert_eq!(quote.quote(), Quote::ZERO);
    }

    #[test]
    fn nonsense_volume_is_a_failure() {
        let mut quote = QuoteMachine::new(ms(100));
        let mut up = UploadPipeline::new(MemoryHandles::new());
        let call = up.begin(file("a.stl"), &mut quote).unwrap();
        let res = up.resolve(call.token, volume(f64::NAN), &mut quote, ms(0));
        assert!(matches!(res, Resolution::Failed(ApiError::Decode(_))));
        assert_eq!(quote.volume_cm3(), None);

        let call = up.begin(file("b.stl"), &mut quote).unwrap();
        let res = up.resolve(call.token, volume(-3.0), &mut quote, ms(0));
        assert!(matches!(res, Resolution::Failed(ApiError::Decode(_))));
    }

    #[test]
    fn empty_volume_is_still_quoted() {
        let mut quote = QuoteMachine::new(ms(100));
        let mut up = UploadPipeline::new(MemoryHandles::new());
        let call = up.begin(file("flat.stl"), &mut quote).unwrap();
        assert_eq!(up.resolve(call.token, volume(0.0), &mut quote, ms(0)), Resolution::Applied(0.0));
        assert_eq!(quote.volume_cm3(), Some(0.0));
        let call = quote.poll(ms(100)).unwrap();
        assert_eq!(call.request.volume_cm3, 0.0);
    }
}
