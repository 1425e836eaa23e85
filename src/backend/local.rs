use std::sync::{Arc, Mutex, MutexGuard};

use crate::api::{
    AnalyzeResponse, ApiFuture, Backend, BatchDetail, BatchItem, BatchSummary, CartItem,
    CartSubmission, FileUpload, PriceRequest, PriceResponse, Progress, QuantityUpdate,
};
use crate::catalog::MaterialId;
use crate::error::ApiError;
use crate::mesh;
use crate::runtime;

/// Fixed fee added to every part (€).
const MARGIN: f64 = 2.00;
/// Share of a part printed solid (walls) regardless of infill.
const SHELL_RATIO: f64 = 0.20;

/// Density in g/cm³ and price in €/g.
fn material_rates(material: MaterialId) -> Option<(f64, f64)> {
    match material {
        MaterialId::Pla => Some((1.24, 0.05)),
        MaterialId::Petg => Some((1.27, 0.06)),
        MaterialId::Abs => Some((1.04, 0.055)),
        MaterialId::Tpu => Some((1.21, 0.08)),
        _ => None,
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn compute_price(request: &PriceRequest) -> Result<PriceResponse, ApiError> {
    let (density, per_gram) = material_rates(request.material).ok_or_else(|| ApiError::Status {
        status: 400,
        body: format!("unknown material {}", request.material),
    })?;
    let v = request.volume_cm3;
    let effective = v * SHELL_RATIO + v * (1.0 - SHELL_RATIO) * (f64::from(request.infill) / 100.0);
    let weight_g = effective * density;
    let price = weight_g * per_gram + MARGIN;
    Ok(PriceResponse { price: round2(price), weight_g: round2(weight_g) })
}

#[derive(Debug, Default)]
struct Store {
    cart: Vec<CartItem>,
    batches: Vec<(BatchSummary, Vec<CartItem>)>,
    next_item: u64,
}

fn manifest(items: &[CartItem]) -> String {
    items
        .iter()
        .map(|i| {
            format!(
                "{} | {} | {} | {}% | x{} | {:.2} €",
                i.filename, i.config.tech, i.config.material, i.config.infill, i.quantity, i.config.price
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// In-process stand-in for the quoting service.
#[derive(Debug, Clone, Default)]
pub struct LocalBackend {
    store: Arc<Mutex<Store>>,
}

impl LocalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_store<T>(
        store: &Mutex<Store>,
        f: impl FnOnce(&mut Store) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let mut guard: MutexGuard<'_, Store> =
            store.lock().map_err(|_| ApiError::Transport("local store poisoned".into()))?;
        f(&mut guard)
    }
}

impl Backend for LocalBackend {
    fn analyze(&self, file: FileUpload) -> ApiFuture<AnalyzeResponse> {
        runtime::boxed(async move {
            let volume_cm3 = mesh::stl_volume_cm3(&file.bytes).map_err(|e| ApiError::Status {
                status: 500,
                body: format!("{e:#}"),
            })?;
            Ok(AnalyzeResponse { volume_cm3 })
        })
    }

    fn calculate_price(&self, request: PriceRequest) -> ApiFuture<PriceResponse> {
        runtime::boxed(async move { compute_price(&request) })
    }

    fn add_to_cart(&self, submission: CartSubmission) -> ApiFuture<()> {
        let store = Arc::clone(&self.store);
        runtime::boxed(async move {
            Self::with_store(&store, |s| {
                s.next_item += 1;
                let id = format!("item-{}", s.next_item);
                s.cart.push(CartItem {
                    id,
                    filename: submission.file.name,
                    config: submission.config,
                    quantity: 1,
                });
                Ok(())
            })
        })
    }

    fn list_cart(&self) -> ApiFuture<Vec<CartItem>> {
        let store = Arc::clone(&self.store);
        runtime::boxed(async move { Self::with_store(&store, |s| Ok(s.cart.clone())) })
    }

    fn update_quantity(&self, update: QuantityUpdate) -> ApiFuture<()> {
        let store = Arc::clone(&self.store);
        runtime::boxed(async move {
            Self::with_store(&store, |s| {
                let item = s.cart.iter_mut().find(|i| i.id == update.item_id).ok_or_else(|| {
                    ApiError::Status { status: 404, body: format!("no cart item {}", update.item_id) }
                })?;
                item.quantity = update.quantity;
                Ok(())
            })
        })
    }

    fn remove_item(&self, item_id: String) -> ApiFuture<()> {
        let store = Arc::clone(&self.store);
        runtime::boxed(async move {
            Self::with_store(&store, |s| {
                s.cart.retain(|i| i.id != item_id);
                Ok(())
            })
        })
    }

    fn launch_production(&self) -> ApiFuture<()> {
        let store = Arc::clone(&self.store);
        runtime::boxed(async move {
            Self::with_store(&store, |s| {
                if s.cart.is_empty() {
                    return Err(ApiError::Rejected("cart is empty".into()));
                }
                let items = std::mem::take(&mut s.cart);
                let summary = BatchSummary {
                    id: format!("BATCH_{:04}", s.batches.len() + 1),
                    status: "Pending".into(),
                    progress: Progress::Text(format!("0/{}", items.len())),
                };
                log::info!("launched {} with {} parts", summary.id, items.len());
                s.batches.push((summary, items));
                Ok(())
            })
        })
    }

    fn list_batches(&self) -> ApiFuture<Vec<BatchSummary>> {
        let store = Arc::clone(&self.store);
        runtime::boxed(async move {
            // Newest first.
            Self::with_store(&store, |s| Ok(s.batches.iter().rev().map(|(b, _)| b.clone()).collect()))
        })
    }

    fn batch_detail(&self, batch_id: String) -> ApiFuture<BatchDetail> {
        let store = Arc::clone(&self.store);
        runtime::boxed(async move {
            Self::with_store(&store, |s| {
                let (_, items) = s.batches.iter().find(|(b, _)| b.id == batch_id).ok_or_else(|| {
                    ApiError::Status { status: 404, body: format!("no batch {batch_id}") }
                })?;
                Ok(BatchDetail {
                    content: manifest(items),
                    items: items
                        .iter()
                        .map(|i| BatchItem {
                            filename: i.filename.clone(),
                            status: "Pending".into(),
                            config: serde_json::to_value(i.config).unwrap_or_default(),
                        })
                        .collect(),
                })
            })
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::api::CartConfig;
    use crate::catalog::Technology;
    use crate::mesh::tests::tetrahedron_stl;
    use approx::assert_relative_eq;
    use futures::executor::block_on;

    fn submission(name: &str, price: f64) -> CartSubmission {
        CartSubmission {
            file: FileUpload { name: name.into(), bytes: Arc::from(&b"solid"[..]) },
            config: CartConfig {
                tech: Technology::Fdm,
                material: MaterialId::Pla,
                infill: 20,
                price,
                weight: 10.0,
                volume: 5.0,
            },
        }
    }

    #[test]
    fn pla_price_matches_rate_table() {
        // effective = 50*0.2 + 50*0.8*0.2 = 18 cm³ → 22.32 g → 1.116 € + 2 €
        let req = PriceRequest { volume_cm3: 50.0, material: MaterialId::Pla, infill: 20 };
        let resp = compute_price(&req).unwrap();
        assert_relative_eq!(resp.weight_g, 22.32);
        assert_relative_eq!(resp.price, 3.12);
    }

    #[test]
    fn more_infill_costs_more() {
        let lo = compute_price(&PriceRequest { volume_cm3: 50.0, material: MaterialId::Petg, infill: 20 }).unwrap();
        let hi = compute_price(&PriceRequest { volume_cm3: 50.0, material: MaterialId::Petg, infill: 80 }).unwrap();
        assert!(hi.price > lo.price);
        assert!(hi.weight_g > lo.weight_g);
    }

    #[test]
    fn unpriced_material_is_rejected() {
        let req = PriceRequest { volume_cm3: 5.0, material: MaterialId::ResinStd, infill: 100 };
        assert!(matches!(compute_price(&req), Err(ApiError::Status { status: 400, .. })));
    }

    #[test]
    fn analyze_reports_cm3() {
        let backend = LocalBackend::new();
        let file = FileUpload { name: "t.stl".into(), bytes: Arc::from(tetrahedron_stl(30.0)) };
        let resp = block_on(backend.analyze(file)).unwrap();
        assert_relative_eq!(resp.volume_cm3, 27_000.0 / 6.0 / 1000.0, epsilon = 1e-6);
    }

    #[test]
    fn cart_roundtrip_and_launch() {
        let backend = LocalBackend::new();
        block_on(backend.add_to_cart(submission("a.stl", 3.0))).unwrap();
        block_on(backend.add_to_cart(submission("b.stl", 4.0))).unwrap();
        let cart = block_on(backend.list_cart()).unwrap();
        assert_eq!(cart.len(), 2);

        block_on(backend.update_quantity(QuantityUpdate { item_id: cart[0].id.clone(), quantity: 3 })).unwrap();
        block_on(backend.remove_item(cart[1].id.clone())).unwrap();
        let cart = block_on(backend.list_cart()).unwrap();
        assert_eq!(cart.len(), 1);
        assert_eq!(cart[0].quantity, 3);

        block_on(backend.launch_production()).unwrap();
        assert!(block_on(backend.list_cart()).unwrap().is_empty());
        let batches = block_on(backend.list_batches()).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].progress, Progress::Text("0/1".into()));
        let detail = block_on(backend.batch_detail(batches[0].id.clone())).unwrap();
        assert_eq!(detail.items.len(), 1);
        assert!(detail.content.contains("a.stl"));

        assert!(block_on(backend.launch_production()).is_err());
        assert!(block_on(backend.batch_detail("nope".into())).is_err());
    }
}
