//! Drives the configuration session: issues remote calls, applies their results,
//! and turns failures into notices.
//!
//! Calls run as spawned tasks. Their results come back over an unbounded channel
//! and are applied on the UI flow during [`Session::poll`], one at a time.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures_channel::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::api::{
    AnalyzeResponse, ApiFuture, Backend, BatchDetail, BatchSummary, CartItem, FileUpload,
    PriceResponse,
};
use crate::cart::{self, CartBook};
use crate::catalog::{MaterialId, Technology};
use crate::config::StudioConfig;
use crate::error::{ApiError, CommitError, Notice, SelectionError};
use crate::history::BatchHistory;
use crate::quote::QuoteMachine;
use crate::runtime::{self, MaybeSend, Spawn};
use crate::token::{Resolution, SequenceToken, TokenSource};
use crate::upload::{HandleStore, ModelId, UploadPipeline};

/// Completion of a spawned remote call.
#[derive(Debug)]
enum Event {
    Analyzed { token: SequenceToken, result: Result<AnalyzeResponse, ApiError> },
    Priced { token: SequenceToken, result: Result<PriceResponse, ApiError> },
    Committed { token: SequenceToken, model: ModelId, result: Result<(), ApiError> },
    CartListed { token: SequenceToken, result: Result<Vec<CartItem>, ApiError> },
    CartChanged { result: Result<(), ApiError> },
    Launched { result: Result<(), ApiError> },
    BatchesListed { token: SequenceToken, result: Result<Vec<BatchSummary>, ApiError> },
    BatchLoaded { token: SequenceToken, result: Result<BatchDetail, ApiError> },
}

pub struct Session<H: HandleStore> {
    quote: QuoteMachine,
    upload: UploadPipeline<H>,
    cart: CartBook,
    history: BatchHistory,
    commits: TokenSource,
    backend: Arc<dyn Backend>,
    spawner: Box<dyn Spawn>,
    tx: UnboundedSender<Event>,
    rx: UnboundedReceiver<Event>,
    notices: VecDeque<Notice>,
}

impl<H: HandleStore> Session<H> {
    pub fn new(config: &StudioConfig, backend: Arc<dyn Backend>, store: H, spawner: Box<dyn Spawn>) -> Self {
        let (tx, rx) = mpsc::unbounded();
        Self {
            quote: QuoteMachine::new(config.debounce()),
            upload: UploadPipeline::new(store),
            cart: CartBook::new(),
            history: BatchHistory::new(),
            commits: TokenSource::new(),
            backend,
            spawner,
            tx,
            rx,
            notices: VecDeque::new(),
        }
    }

    pub fn quote(&self) -> &QuoteMachine {
        &self.quote
    }

    pub fn upload(&self) -> &UploadPipeline<H> {
        &self.upload
    }

    pub fn cart(&self) -> &CartBook {
        &self.cart
    }

    pub fn history(&self) -> &BatchHistory {
        &self.history
    }

    pub fn spawner(&self) -> &dyn Spawn {
        self.spawner.as_ref()
    }

    /// Identity of the file currently configured.
    pub fn current_model(&self) -> Option<ModelId> {
        self.upload.current().map(|a| a.id())
    }

    pub fn is_committing(&self) -> bool {
        self.commits.in_flight()
    }

    /// Something is pending that will change visible state.
    pub fn is_busy(&self) -> bool {
        self.quote.is_computing()
            || self.upload.is_analyzing()
            || self.is_committing()
            || self.cart.is_loading()
            || self.history.is_loading()
            || self.history.is_loading_detail()
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

    fn dispatch<T: MaybeSend + 'static>(
        &self,
        call: ApiFuture<T>,
        wrap: impl FnOnce(Result<T, ApiError>) -> Event + MaybeSend + 'static,
    ) {
        let tx = self.tx.clone();
        self.spawner.spawn(runtime::boxed(async move {
            let result = call.await;
            // Receiver gone means the session ended; the result has no audience.
            let _ = tx.unbounded_send(wrap(result));
        }));
    }

    /// Start a new configuration with `file`. Returns its model identity for the viewer.
    pub fn upload_file(&mut self, file: FileUpload) -> Option<ModelId> {
        match self.upload.begin(file, &mut self.quote) {
            Ok(call) => {
                let token = call.token;
                let fut = self.backend.analyze(call.file);
                self.dispatch(fut, move |result| Event::Analyzed { token, result });
                Some(call.model)
            }
            Err(e) => {
                log::error!("{e}");
                self.notices.push_back(Notice::error(e.to_string()));
                None
            }
        }
    }

    pub fn set_technology(&mut self, technology: Technology, now: Duration) {
        self.quote.set_technology(technology, now);
    }

    pub fn set_material(&mut self, material: MaterialId, now: Duration) -> bool {
        Self::accepted(self.quote.set_material(material, now))
    }

    pub fn set_infill(&mut self, percent: u8, now: Duration) -> bool {
        Self::accepted(self.quote.set_infill(percent, now))
    }

    fn accepted(result: Result<(), SelectionError>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                log::debug!("selection ignored: {e}");
                false
            }
        }
    }

    pub fn retry_quote(&mut self, now: Duration) -> bool {
        self.quote.retry(now)
    }

    /// Whether [`Session::commit`] would submit right now.
    pub fn can_commit(&self) -> bool {
        !self.commits.in_flight() && cart::prepare_commit(&self.upload, &self.quote).is_ok()
    }

    /// Submit the current configuration to the cart.
    ///
    /// Refused without any network traffic unless a file is loaded, its quote is
    /// positive and current, and nothing is being computed or submitted.
    pub fn commit(&mut self) -> Result<(), CommitError> {
        if self.commits.in_flight() {
            return Err(CommitError::InFlight);
        }
        let line = cart::prepare_commit(&self.upload, &self.quote)?;
        let token = self.commits.issue();
        let model = line.model;
        log::info!("submitting {} to cart ({:.2})", line.file.name, line.price);
        let fut = self.backend.add_to_cart(line.submission());
        self.dispatch(fut, move |result| Event::Committed { token, model, result });
        Ok(())
    }

    pub fn refresh_cart(&mut self) {
        let token = self.cart.begin_refresh();
        let fut = self.backend.list_cart();
        self.dispatch(fut, move |result| Event::CartListed { token, result });
    }

    pub fn set_quantity(&mut self, item_id: &str, quantity: u32) -> bool {
        let Some(update) = self.cart.quantity_update(item_id, quantity) else {
            return false;
        };
        let fut = self.backend.update_quantity(update);
        self.dispatch(fut, |result| Event::CartChanged { result });
        true
    }

    pub fn remove_item(&mut self, item_id: &str) {
        let fut = self.backend.remove_item(item_id.to_owned());
        self.dispatch(fut, |result| Event::CartChanged { result });
    }

    pub fn launch_production(&mut self) {
        let fut = self.backend.launch_production();
        self.dispatch(fut, |result| Event::Launched { result });
    }

    pub fn refresh_batches(&mut self) {
        let token = self.history.begin_refresh();
        let fut = self.backend.list_batches();
        self.dispatch(fut, move |result| Event::BatchesListed { token, result });
    }

    pub fn select_batch(&mut self, batch_id: &str) {
        let token = self.history.select(batch_id);
        let fut = self.backend.batch_detail(batch_id.to_owned());
        self.dispatch(fut, move |result| Event::BatchLoaded { token, result });
    }

    /// Apply completed calls and issue a due price computation.
    pub fn poll(&mut self, now: Duration) {
        while let Ok(event) = self.rx.try_recv() {
            self.apply(event, now);
        }
        if let Some(call) = self.quote.poll(now) {
            let token = call.token;
            let fut = self.backend.calculate_price(call.request);
            self.dispatch(fut, move |result| Event::Priced { token, result });
        }
    }

    fn apply(&mut self, event: Event, now: Duration) {
        match event {
            Event::Analyzed { token, result } => {
                if let Resolution::Failed(e) = self.upload.resolve(token, result, &mut self.quote, now) {
                    self.notices.push_back(Notice::error(format!("Could not analyze the file: {e}")));
                }
            }
            Event::Priced { token, result } => {
                if let Resolution::Failed(e) = self.quote.resolve(token, result) {
                    self.notices.push_back(Notice::warning(format!("Price unavailable: {e}")));
                }
            }
            Event::Committed { token, model, result } => {
                if !self.commits.settle(token) {
                    return;
                }
                match result {
                    Ok(()) => {
                        if self.current_model() == Some(model) {
                            self.upload.end_session();
                            self.quote.reset_session();
                        }
                        log::info!("cart accepted model {model}");
                        self.notices.push_back(Notice::info("Part added to the cart"));
                        self.refresh_cart();
                    }
                    Err(e) => {
                        log::warn!("cart submission failed: {e}");
                        self.notices.push_back(Notice::error(format!("Could not save to cart: {e}")));
                    }
                }
            }
            Event::CartListed { token, result } => {
                if let Resolution::Failed(e) = self.cart.resolve_refresh(token, result) {
                    self.notices.push_back(Notice::warning(format!("Could not load the cart: {e}")));
                }
            }
            Event::CartChanged { result } => {
                if let Err(e) = result {
                    self.notices.push_back(Notice::warning(format!("Cart update failed: {e}")));
                }
                self.refresh_cart();
            }
            Event::Launched { result } => match result {
                Ok(()) => {
                    self.cart.launched();
                    self.notices.push_back(Notice::info("Production launched"));
                    self.refresh_batches();
                }
                Err(e) => {
                    self.notices.push_back(Notice::error(format!("Could not launch production: {e}")));
                }
            },
            Event::BatchesListed { token, result } => {
                if let Resolution::Failed(e) = self.history.resolve_refresh(token, result) {
                    self.notices.push_back(Notice::warning(format!("Could not load batches: {e}")));
                }
            }
            Event::BatchLoaded { token, result } => {
                if let Resolution::Failed(e) = self.history.resolve_detail(token, result) {
                    self.notices.push_back(Notice::warning(format!("Could not load the batch: {e}")));
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::api::{CartSubmission, PriceRequest, QuantityUpdate};
    use crate::error::NoticeLevel;
    use crate::quote::Quote;
    use crate::runtime::testing::PoolSpawner;
    use crate::upload::MemoryHandles;
    use approx::assert_relative_eq;
    use futures::FutureExt;
    use futures::channel::oneshot;
    use futures::executor::LocalPool;
    use std::sync::Mutex;

    type Reply<T> = oneshot::Sender<Result<T, ApiError>>;

    /// Backend whose answers are handed out by the test, in any order.
    #[derive(Default)]
    struct Scripted {
        analyses: Mutex<Vec<(String, Reply<AnalyzeResponse>)>>,
        prices: Mutex<Vec<(PriceRequest, Reply<PriceResponse>)>>,
        submissions: Mutex<Vec<(CartSubmission, Reply<()>)>>,
        cart_lists: Mutex<usize>,
    }

    fn pending<T: Send + 'static>() -> (Reply<T>, ApiFuture<T>) {
        let (tx, rx) = oneshot::channel();
        let fut = rx.map(|r| r.unwrap_or_else(|_| Err(ApiError::Transport("dropped".into()))));
        (tx, runtime::boxed(fut))
    }

    impl Backend for Scripted {
        fn analyze(&self, file: FileUpload) -> ApiFuture<AnalyzeResponse> {
            let (tx, fut) = pending();
            self.analyses.lock().unwrap().push((file.name, tx));
            fut
        }

        fn calculate_price(&self, request: PriceRequest) -> ApiFuture<PriceResponse> {
            let (tx, fut) = pending();
            self.prices.lock().unwrap().push((request, tx));
            fut
        }

        fn add_to_cart(&self, submission: CartSubmission) -> ApiFuture<()> {
            let (tx, fut) = pending();
            self.submissions.lock().unwrap().push((submission, tx));
            fut
        }

        fn list_cart(&self) -> ApiFuture<Vec<CartItem>> {
            *self.cart_lists.lock().unwrap() += 1;
            runtime::boxed(futures::future::ready(Ok(Vec::new())))
        }

        fn update_quantity(&self, _update: QuantityUpdate) -> ApiFuture<()> {
            runtime::boxed(futures::future::ready(Ok(())))
        }

        fn remove_item(&self, _item_id: String) -> ApiFuture<()> {
            runtime::boxed(futures::future::ready(Ok(())))
        }

        fn launch_production(&self) -> ApiFuture<()> {
            runtime::boxed(futures::future::ready(Ok(())))
        }

        fn list_batches(&self) -> ApiFuture<Vec<BatchSummary>> {
            runtime::boxed(futures::future::ready(Ok(Vec::new())))
        }

        fn batch_detail(&self, _batch_id: String) -> ApiFuture<BatchDetail> {
            runtime::boxed(futures::future::ready(Ok(BatchDetail::default())))
        }
    }

    impl Scripted {
        fn answer_analysis(&self, index: usize, volume_cm3: f64) {
            let (_, tx) = self.analyses.lock().unwrap().remove(index);
            tx.send(Ok(AnalyzeResponse { volume_cm3 })).unwrap();
        }

        fn answer_price(&self, index: usize, result: Result<PriceResponse, ApiError>) -> PriceRequest {
            let (req, tx) = self.prices.lock().unwrap().remove(index);
            tx.send(result).unwrap();
            req
        }

        fn price_requests(&self) -> Vec<PriceRequest> {
            self.prices.lock().unwrap().iter().map(|(r, _)| *r).collect()
        }

        fn submission_count(&self) -> usize {
            self.submissions.lock().unwrap().len()
        }

        fn answer_submission(&self, result: Result<(), ApiError>) -> CartSubmission {
            let (sub, tx) = self.submissions.lock().unwrap().remove(0);
            tx.send(result).unwrap();
            sub
        }
    }

    struct Harness {
        pool: LocalPool,
        backend: Arc<Scripted>,
        session: Session<MemoryHandles>,
    }

    impl Harness {
        fn new() -> Self {
            let pool = LocalPool::new();
            let backend = Arc::new(Scripted::default());
            let session = Session::new(
                &StudioConfig::default(),
                backend.clone(),
                MemoryHandles::new(),
                Box::new(PoolSpawner(pool.spawner())),
            );
            Self { pool, backend, session }
        }

        /// Let tasks run, then apply what they produced at `now`.
        fn step(&mut self, now_ms: u64) {
            self.pool.run_until_stalled();
            self.session.poll(Duration::from_millis(now_ms));
            self.pool.run_until_stalled();
        }

        fn upload(&mut self, name: &str) -> ModelId {
            let file = FileUpload { name: name.into(), bytes: Arc::from(name.as_bytes()) };
            self.session.upload_file(file).unwrap()
        }

        /// Upload, resolve the analysis and the first price.
        fn priced(&mut self, volume: f64, price: f64) {
            self.upload("part.stl");
            self.step(0);
            self.backend.answer_analysis(0, volume);
            self.step(0);
            self.step(100);
            self.backend.answer_price(0, Ok(PriceResponse { price, weight_g: 10.0 }));
            self.step(150);
        }
    }

    #[test]
    fn infill_change_reprices_and_drops_old_answer() {
        let mut h = Harness::new();
        h.upload("part.stl");
        h.step(0);
        h.backend.answer_analysis(0, 50.0);
        h.step(0);
        h.step(100);
        assert_eq!(
            h.backend.price_requests(),
            vec![PriceRequest { volume_cm3: 50.0, material: MaterialId::Pla, infill: 20 }]
        );

        assert!(h.session.set_infill(40, Duration::from_millis(120)));
        h.step(150);
        assert_eq!(h.backend.price_requests().len(), 1);
        h.step(220);
        let requests = h.backend.price_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].infill, 40);

        // The newer answer arrives first, the older one after it.
        h.backend.answer_price(1, Ok(PriceResponse { price: 7.2, weight_g: 30.0 }));
        h.step(300);
        h.backend.answer_price(0, Ok(PriceResponse { price: 3.1, weight_g: 22.0 }));
        h.step(320);

        assert_relative_eq!(h.session.quote().quote().price, 7.2);
        assert!(!h.session.quote().is_computing());
        assert!(h.session.drain_notices().is_empty());
    }

    #[test]
    fn upload_resets_before_any_response() {
        let mut h = Harness::new();
        h.priced(50.0, 3.1);
        assert!(h.session.quote().quote().is_priced());

        h.upload("other.stl");
        assert_eq!(h.session.quote().volume_cm3(), None);
        assert_eq!(h.session.quote().quote(), Quote::ZERO);
    }

    #[test]
    fn late_analysis_of_replaced_file_is_ignored() {
        let mut h = Harness::new();
        let a = h.upload("a.stl");
        let b = h.upload("b.stl");
        assert_ne!(a, b);
        h.step(0);

        h.backend.answer_analysis(0, 11.0);
        h.step(10);
        assert_eq!(h.session.quote().volume_cm3(), None);
        assert!(h.session.upload().is_analyzing());

        h.backend.answer_analysis(0, 22.0);
        h.step(20);
        assert_eq!(h.session.quote().volume_cm3(), Some(22.0));
        assert_eq!(h.session.upload().store().live(), 1);
    }

    #[test]
    fn zero_price_never_submits() {
        let mut h = Harness::new();
        h.upload("part.stl");
        h.step(0);
        assert_eq!(h.session.commit(), Err(CommitError::Computing));
        h.backend.answer_analysis(0, 0.0);
        h.step(10);
        assert_eq!(h.session.quote().volume_cm3(), Some(0.0));
        assert_eq!(h.session.commit(), Err(CommitError::Computing));
        h.step(110);
        h.backend.answer_price(0, Ok(PriceResponse { price: 0.0, weight_g: 0.0 }));
        h.step(120);

        assert!(!h.session.quote().is_computing());
        assert!(!h.session.can_commit());
        assert_eq!(h.session.commit(), Err(CommitError::ZeroPrice));
        h.step(200);
        assert_eq!(h.backend.submission_count(), 0);
        assert!(h.session.drain_notices().is_empty());
    }

    #[test]
    fn failed_analysis_refuses_commit_with_notice() {
        let mut h = Harness::new();
        h.upload("part.stl");
        h.step(0);
        let (_, tx) = h.backend.analyses.lock().unwrap().remove(0);
        tx.send(Err(ApiError::Status { status: 422, body: "not a mesh".into() })).unwrap();
        h.step(10);
        assert_eq!(h.session.commit(), Err(CommitError::ZeroPrice));
        assert_eq!(h.backend.submission_count(), 0);
        assert_eq!(h.session.drain_notices()[0].level, NoticeLevel::Error);
    }

    #[test]
    fn commit_consumes_the_session() {
        let mut h = Harness::new();
        h.priced(50.0, 3.1);
        h.session.set_technology(Technology::Resin, Duration::from_millis(200));
        h.step(300);
        h.backend.answer_price(0, Ok(PriceResponse { price: 9.9, weight_g: 62.0 }));
        h.step(350);

        assert!(h.session.can_commit());
        h.session.commit().unwrap();
        assert!(!h.session.can_commit());
        assert_eq!(h.session.commit(), Err(CommitError::InFlight));
        h.step(400);
        let sub = h.backend.answer_submission(Ok(()));
        assert_eq!(sub.config.infill, 100);
        assert_eq!(sub.config.material, MaterialId::ResinStd);
        assert_relative_eq!(sub.config.price, 9.9);
        h.step(450);

        assert_eq!(h.session.current_model(), None);
        assert_eq!(h.session.quote().selection().technology, Technology::Fdm);
        assert_eq!(h.session.upload().store().live(), 0);
        assert_eq!(h.session.commit(), Err(CommitError::NoFile));
        assert_eq!(h.backend.submission_count(), 0);
        assert_eq!(*h.backend.cart_lists.lock().unwrap(), 1);
    }

    #[test]
    fn failed_commit_leaves_state_for_retry() {
        let mut h = Harness::new();
        h.priced(50.0, 3.1);
        let model = h.session.current_model();
        h.session.commit().unwrap();
        h.step(200);
        h.backend.answer_submission(Err(ApiError::Status { status: 503, body: "busy".into() }));
        h.step(250);

        assert_eq!(h.session.current_model(), model);
        assert_relative_eq!(h.session.quote().quote().price, 3.1);
        let notices = h.session.drain_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);

        h.session.commit().unwrap();
        h.step(300);
        assert_eq!(h.backend.submission_count(), 1);
    }

    #[test]
    fn commit_success_after_new_upload_keeps_new_file() {
        let mut h = Harness::new();
        h.priced(50.0, 3.1);
        h.session.commit().unwrap();
        h.step(200);
        let newer = h.upload("newer.stl");
        h.backend.answer_submission(Ok(()));
        h.step(250);
        assert_eq!(h.session.current_model(), Some(newer));
    }

    #[test]
    fn failed_price_is_a_warning_and_keeps_quote() {
        let mut h = Harness::new();
        h.priced(50.0, 3.1);
        h.session.set_material(MaterialId::Abs, Duration::from_millis(200));
        h.step(300);
        h.backend.answer_price(0, Err(ApiError::Transport("offline".into())));
        h.step(350);

        assert_relative_eq!(h.session.quote().quote().price, 3.1);
        assert!(!h.session.quote().is_computing());
        let notices = h.session.drain_notices();
        assert_eq!(notices[0].level, NoticeLevel::Warning);

        assert!(h.session.retry_quote(Duration::from_millis(400)));
        h.step(500);
        assert_eq!(h.backend.price_requests()[0].material, MaterialId::Abs);
    }

    #[test]
    fn rejected_selection_changes_nothing() {
        let mut h = Harness::new();
        h.priced(50.0, 3.1);
        assert!(!h.session.set_material(MaterialId::NylonGlass, Duration::from_millis(200)));
        assert!(!h.session.set_infill(15, Duration::from_millis(200)));
        h.step(400);
        assert!(h.backend.price_requests().is_empty());
        assert!(h.session.drain_notices().is_empty());
    }
}
