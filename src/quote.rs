//! Selection state and the derived price quote.
//!
//! The machine recomputes whenever one of its price inputs changes:
//! `{volume, material, effective infill}`. A change schedules a single call after
//! the debounce window; a later change pushes the window out and supersedes any
//! call already in flight. Only the response to the latest issued call is applied.

use std::time::Duration;

use crate::api::{PriceRequest, PriceResponse};
use crate::catalog::{self, DEFAULT_INFILL, FULL_DENSITY, MaterialId, Technology};
use crate::error::{ApiError, SelectionError};
use crate::token::{Resolution, SequenceToken, TokenSource};

/// What the user picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub technology: Technology,
    pub material: MaterialId,
    /// The FDM infill choice. Kept while another technology is selected.
    pub infill: u8,
}

impl Default for Selection {
    fn default() -> Self {
        let technology = Technology::default();
        Self { technology, material: technology.default_material(), infill: DEFAULT_INFILL }
    }
}

impl Selection {
    /// Infill used for quoting and ordering.
    pub fn effective_infill(&self) -> u8 {
        if self.technology.has_infill() { self.infill } else { FULL_DENSITY }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Quote {
    pub price: f64,
    pub weight_g: f64,
}

impl Quote {
    pub const ZERO: Quote = Quote { price: 0.0, weight_g: 0.0 };

    pub fn is_priced(&self) -> bool {
        self.price > 0.0
    }
}

impl From<PriceResponse> for Quote {
    fn from(resp: PriceResponse) -> Self {
        Self { price: resp.price, weight_g: resp.weight_g }
    }
}

/// A price call the owner must issue and later report back with [`QuoteMachine::resolve`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceCall {
    pub token: SequenceToken,
    pub request: PriceRequest,
}

#[derive(Debug, Clone, Copy)]
struct Scheduled {
    due: Duration,
    request: PriceRequest,
}

#[derive(Debug)]
pub struct QuoteMachine {
    selection: Selection,
    volume_cm3: Option<f64>,
    quote: Quote,
    /// Inputs `quote` was computed for.
    quoted_for: Option<PriceRequest>,
    computing: bool,
    debounce: Duration,
    scheduled: Option<Scheduled>,
    /// Inputs of the latest scheduled or issued call; changes equal to it are no-ops.
    requested: Option<PriceRequest>,
    in_flight: Option<PriceRequest>,
    tokens: TokenSource,
}

impl QuoteMachine {
    pub fn new(debounce: Duration) -> Self {
        Self {
            selection: Selection::default(),
            volume_cm3: None,
            quote: Quote::ZERO,
            quoted_for: None,
            computing: false,
            debounce,
            scheduled: None,
            requested: None,
            in_flight: None,
            tokens: TokenSource::new(),
        }
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn volume_cm3(&self) -> Option<f64> {
        self.volume_cm3
    }

    pub fn quote(&self) -> Quote {
        self.quote
    }

    /// True from the moment a recompute is scheduled until the latest call resolves.
    pub fn is_computing(&self) -> bool {
        self.computing
    }

    /// Inputs the next price call would carry, if the volume is known.
    pub fn price_inputs(&self) -> Option<PriceRequest> {
        self.volume_cm3.map(|volume_cm3| PriceRequest {
            volume_cm3,
            material: self.selection.material,
            infill: self.selection.effective_infill(),
        })
    }

    /// Whether the displayed quote was computed for the current inputs.
    pub fn is_current(&self) -> bool {
        self.quote.is_priced() && self.quoted_for.is_some() && self.quoted_for == self.price_inputs()
    }

    /// Select `technology` and reset the material to its default.
    pub fn set_technology(&mut self, technology: Technology, now: Duration) {
        self.selection.technology = technology;
        self.selection.material = technology.default_material();
        log::debug!("technology {technology}, material reset to {}", self.selection.material);
        self.inputs_changed(now);
    }

    pub fn set_technology_key(&mut self, key: &str, now: Duration) -> Result<(), SelectionError> {
        let technology = key.parse()?;
        self.set_technology(technology, now);
        Ok(())
    }

    pub fn set_material(&mut self, material: MaterialId, now: Duration) -> Result<(), SelectionError> {
        let technology = self.selection.technology;
        if !technology.offers(material) {
            return Err(SelectionError::MaterialNotOffered { material, technology });
        }
        self.selection.material = material;
        self.inputs_changed(now);
        Ok(())
    }

    pub fn set_material_key(&mut self, key: &str, now: Duration) -> Result<(), SelectionError> {
        self.set_material(key.parse()?, now)
    }

    pub fn set_infill(&mut self, percent: u8, now: Duration) -> Result<(), SelectionError> {
        if !catalog::is_valid_infill(percent) {
            return Err(SelectionError::InfillOutOfDomain(percent));
        }
        self.selection.infill = percent;
        self.inputs_changed(now);
        Ok(())
    }

    pub fn on_volume_known(&mut self, volume_cm3: f64, now: Duration) {
        self.volume_cm3 = Some(volume_cm3);
        self.inputs_changed(now);
    }

    /// Forget the volume and quote of the previous file. Pending and in-flight
    /// price calls become stale.
    pub fn reset_for_new_file(&mut self) {
        self.volume_cm3 = None;
        self.quote = Quote::ZERO;
        self.quoted_for = None;
        self.clear_calls();
    }

    /// Back to a fresh configuration session.
    pub fn reset_session(&mut self) {
        self.selection = Selection::default();
        self.reset_for_new_file();
    }

    /// Schedule the current inputs again, e.g. after a failed call.
    ///
    /// Returns `false` when there is nothing to compute or a computation is running.
    pub fn retry(&mut self, now: Duration) -> bool {
        if self.computing || self.volume_cm3.is_none() {
            return false;
        }
        self.requested = None;
        self.inputs_changed(now);
        true
    }

    /// Issue the scheduled call once its debounce window has elapsed.
    pub fn poll(&mut self, now: Duration) -> Option<PriceCall> {
        let due = self.scheduled.is_some_and(|s| s.due <= now);
        if !due {
            return None;
        }
        let scheduled = self.scheduled.take()?;
        let token = self.tokens.issue();
        self.in_flight = Some(scheduled.request);
        log::debug!("price call {token}: {:?}", scheduled.request);
        Some(PriceCall { token, request: scheduled.request })
    }

    /// Report the outcome of a price call.
    pub fn resolve(
        &mut self,
        token: SequenceToken,
        result: Result<PriceResponse, ApiError>,
    ) -> Resolution<Quote, ApiError> {
        if !self.tokens.settle(token) {
            log::debug!("discarding stale price response {token}");
            return Resolution::Stale;
        }
        let request = self.in_flight.take();
        self.computing = self.scheduled.is_some();
        match result {
            Ok(resp) => {
                self.quote = resp.into();
                self.quoted_for = request;
                Resolution::Applied(self.quote)
            }
            Err(e) => {
                log::warn!("price computation failed: {e}");
                // Same inputs may be requested again.
                self.requested = None;
                Resolution::Failed(e)
            }
        }
    }

    fn inputs_changed(&mut self, now: Duration) {
        let Some(request) = self.price_inputs() else {
            self.quote = Quote::ZERO;
            self.quoted_for = None;
            self.clear_calls();
            return;
        };
        if self.requested == Some(request) {
            return;
        }
        self.requested = Some(request);
        self.scheduled = Some(Scheduled { due: now + self.debounce, request });
        self.tokens.supersede();
        self.in_flight = None;
        self.computing = true;
    }

    fn clear_calls(&mut self) {
        self.scheduled = None;
        self.requested = None;
        self.in_flight = None;
        self.tokens.supersede();
        self.computing = false;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const WINDOW: Duration = Duration::from_millis(100);

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn priced(price: f64, weight_g: f64) -> Result<PriceResponse, ApiError> {
        Ok(PriceResponse { price, weight_g })
    }

    fn machine_with_volume(volume: f64) -> (QuoteMachine, PriceCall) {
        let mut m = QuoteMachine::new(WINDOW);
        m.on_volume_known(volume, ms(0));
        let call = m.poll(ms(100)).unwrap();
        (m, call)
    }

    #[test]
    fn technology_switch_resets_material() {
        let mut m = QuoteMachine::new(WINDOW);
        for tech in [Technology::Resin, Technology::Sls, Technology::Fdm, Technology::Sls] {
            m.set_technology(tech, ms(0));
            assert!(tech.offers(m.selection().material));
            assert_eq!(m.selection().material, tech.default_material());
        }
    }

    #[test]
    fn foreign_material_is_ignored() {
        let mut m = QuoteMachine::new(WINDOW);
        let err = m.set_material(MaterialId::ResinTough, ms(0)).unwrap_err();
        assert!(matches!(err, SelectionError::MaterialNotOffered { .. }));
        assert_eq!(m.selection().material, MaterialId::Pla);
        assert!(m.set_material_key("BRONZE", ms(0)).is_err());
        assert!(m.set_material_key("ABS", ms(0)).is_ok());
        assert_eq!(m.selection().material, MaterialId::Abs);
    }

    #[test]
    fn infill_outside_domain_is_ignored() {
        let mut m = QuoteMachine::new(WINDOW);
        assert!(m.set_infill(5, ms(0)).is_err());
        assert!(m.set_infill(35, ms(0)).is_err());
        assert_eq!(m.selection().infill, DEFAULT_INFILL);
        m.set_infill(60, ms(0)).unwrap();
        assert_eq!(m.selection().infill, 60);
    }

    #[test]
    fn non_fdm_quotes_full_density() {
        let mut m = QuoteMachine::new(WINDOW);
        m.set_infill(40, ms(0)).unwrap();
        m.set_technology(Technology::Resin, ms(0));
        m.on_volume_known(10.0, ms(0));
        let call = m.poll(ms(100)).unwrap();
        assert_eq!(call.request.infill, FULL_DENSITY);
        assert_eq!(call.request.material, MaterialId::ResinStd);

        m.set_technology(Technology::Fdm, ms(200));
        assert_eq!(m.price_inputs().unwrap().infill, 40);
    }

    #[test]
    fn no_call_without_volume() {
        let mut m = QuoteMachine::new(WINDOW);
        m.set_material(MaterialId::Petg, ms(0)).unwrap();
        assert!(!m.is_computing());
        assert_eq!(m.poll(ms(1_000)), None);
        assert_eq!(m.quote(), Quote::ZERO);
    }

    #[test]
    fn call_waits_for_debounce_window() {
        let mut m = QuoteMachine::new(WINDOW);
        m.on_volume_known(50.0, ms(0));
        assert!(m.is_computing());
        assert_eq!(m.poll(ms(99)), None);
        let call = m.poll(ms(100)).unwrap();
        assert_eq!(call.request, PriceRequest { volume_cm3: 50.0, material: MaterialId::Pla, infill: 20 });
        assert_eq!(m.poll(ms(500)), None);
    }

    #[test]
    fn burst_collapses_into_one_call() {
        let mut m = QuoteMachine::new(WINDOW);
        m.on_volume_known(50.0, ms(0));
        m.set_infill(40, ms(30)).unwrap();
        m.set_infill(60, ms(60)).unwrap();
        m.set_material(MaterialId::Tpu, ms(90)).unwrap();
        assert_eq!(m.poll(ms(150)), None);
        let call = m.poll(ms(190)).unwrap();
        assert_eq!(call.request.infill, 60);
        assert_eq!(call.request.material, MaterialId::Tpu);
        assert_eq!(m.poll(ms(400)), None);
    }

    #[test]
    fn unchanged_inputs_do_not_reschedule() {
        let (mut m, call) = machine_with_volume(50.0);
        m.resolve(call.token, priced(5.0, 20.0));
        m.set_infill(20, ms(200)).unwrap();
        m.set_technology(Technology::Fdm, ms(200));
        assert!(!m.is_computing());
        assert_eq!(m.poll(ms(1_000)), None);
    }

    #[test]
    fn latest_issued_wins_under_reordering() {
        let (mut m, first) = machine_with_volume(50.0);
        m.set_infill(40, ms(110)).unwrap();
        let second = m.poll(ms(210)).unwrap();
        assert!(second.token > first.token);

        assert!(matches!(m.resolve(second.token, priced(7.0, 30.0)), Resolution::Applied(_)));
        assert_eq!(m.resolve(first.token, priced(5.0, 20.0)), Resolution::Stale);
        assert_relative_eq!(m.quote().price, 7.0);
        assert!(!m.is_computing());
        assert!(m.is_current());
    }

    #[test]
    fn scheduling_supersedes_call_in_flight() {
        let (mut m, first) = machine_with_volume(50.0);
        m.set_infill(40, ms(110)).unwrap();
        // The old response lands inside the new debounce window.
        assert_eq!(m.resolve(first.token, priced(5.0, 20.0)), Resolution::Stale);
        assert_eq!(m.quote(), Quote::ZERO);
        assert!(m.is_computing());
    }

    #[test]
    fn failure_keeps_previous_quote() {
        let (mut m, call) = machine_with_volume(50.0);
        m.resolve(call.token, priced(5.0, 20.0));
        m.set_infill(80, ms(200)).unwrap();
        let call = m.poll(ms(300)).unwrap();
        let res = m.resolve(call.token, Err(ApiError::Transport("offline".into())));
        assert!(matches!(res, Resolution::Failed(_)));
        assert!(!m.is_computing());
        assert_relative_eq!(m.quote().price, 5.0);
        assert!(!m.is_current());

        assert!(m.retry(ms(400)));
        let again = m.poll(ms(500)).unwrap();
        assert_eq!(again.request.infill, 80);
    }

    #[test]
    fn new_file_drops_everything() {
        let (mut m, call) = machine_with_volume(50.0);
        m.reset_for_new_file();
        assert_eq!(m.volume_cm3(), None);
        assert_eq!(m.quote(), Quote::ZERO);
        assert!(!m.is_computing());
        assert_eq!(m.resolve(call.token, priced(5.0, 20.0)), Resolution::Stale);
        assert_eq!(m.quote(), Quote::ZERO);
    }

    #[test]
    fn session_reset_restores_defaults() {
        let mut m = QuoteMachine::new(WINDOW);
        m.set_technology(Technology::Sls, ms(0));
        m.on_volume_known(3.0, ms(0));
        m.reset_session();
        assert_eq!(m.selection(), Selection::default());
        assert_eq!(m.volume_cm3(), None);
    }
}
