//! Cart commit and the cart dashboard.

use crate::api::{CartConfig, CartItem, CartSubmission, FileUpload, QuantityUpdate};
use crate::catalog::{MaterialId, Technology};
use crate::error::{ApiError, CommitError};
use crate::quote::QuoteMachine;
use crate::token::{Resolution, SequenceToken, TokenSource};
use crate::upload::{HandleStore, ModelId, UploadPipeline};

/// One configured part, built once at commit time.
#[derive(Debug, Clone, PartialEq)]
pub struct CartLineItem {
    pub model: ModelId,
    pub file: FileUpload,
    pub technology: Technology,
    pub material: MaterialId,
    /// Already forced to full density for non-FDM technologies.
    pub infill: u8,
    pub price: f64,
    pub weight_g: f64,
    pub volume_cm3: f64,
    pub quantity: u32,
}

impl CartLineItem {
    pub fn submission(&self) -> CartSubmission {
        CartSubmission {
            file: self.file.clone(),
            config: CartConfig {
                tech: self.technology,
                material: self.material,
                infill: self.infill,
                price: self.price,
                weight: self.weight_g,
                volume: self.volume_cm3,
            },
        }
    }
}

/// Check commit preconditions and package the current configuration.
///
/// Nothing here touches the network; a refusal means no submission is made.
pub fn prepare_commit<H: HandleStore>(
    upload: &UploadPipeline<H>,
    quote: &QuoteMachine,
) -> Result<CartLineItem, CommitError> {
    let asset = upload.current().ok_or(CommitError::NoFile)?;
    if upload.is_analyzing() || quote.is_computing() {
        return Err(CommitError::Computing);
    }
    let q = quote.quote();
    if !q.is_priced() {
        return Err(CommitError::ZeroPrice);
    }
    let inputs = quote.price_inputs().filter(|_| quote.is_current()).ok_or(CommitError::StaleQuote)?;
    let selection = quote.selection();
    Ok(CartLineItem {
        model: asset.id(),
        file: asset.file().clone(),
        technology: selection.technology,
        material: inputs.material,
        infill: inputs.infill,
        price: q.price,
        weight_g: q.weight_g,
        volume_cm3: inputs.volume_cm3,
        quantity: 1,
    })
}

/// Client view of the remote cart.
#[derive(Debug, Default)]
pub struct CartBook {
    items: Vec<CartItem>,
    tokens: TokenSource,
}

impl CartBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn is_loading(&self) -> bool {
        self.tokens.in_flight()
    }

    /// Σ price × quantity.
    pub fn total(&self) -> f64 {
        self.items.iter().map(|i| i.config.price * f64::from(i.quantity)).sum()
    }

    pub fn begin_refresh(&mut self) -> SequenceToken {
        self.tokens.issue()
    }

    pub fn resolve_refresh(
        &mut self,
        token: SequenceToken,
        result: Result<Vec<CartItem>, ApiError>,
    ) -> Resolution<usize, ApiError> {
        if !self.tokens.settle(token) {
            return Resolution::Stale;
        }
        match result {
            Ok(items) => {
                self.items = items;
                Resolution::Applied(self.items.len())
            }
            Err(e) => Resolution::Failed(e),
        }
    }

    /// Quantity change request, `None` when the quantity is not allowed.
    pub fn quantity_update(&self, item_id: &str, quantity: u32) -> Option<QuantityUpdate> {
        if quantity < 1 || !self.items.iter().any(|i| i.id == item_id) {
            return None;
        }
        Some(QuantityUpdate { item_id: item_id.to_owned(), quantity })
    }

    /// Production was launched; the cart now lives in a batch.
    pub fn launched(&mut self) {
        self.items.clear();
        self.tokens.supersede();
    }
}
