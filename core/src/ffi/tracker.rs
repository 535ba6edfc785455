//! PyO3 wrapper for the ledger tracker
//!
//! This module provides the Python interface to the Rust tracker.

use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use super::types::{
    agent_info_to_py, fact_to_py, parse_chain_event, parse_nonexistence_proof,
    parse_payment_proof, parse_price, parse_settings, status_to_str,
};
use crate::tracker::{LedgerSnapshot, LedgerTracker, TrackerError};

fn tracker_err(e: TrackerError) -> PyErr {
    match e {
        TrackerError::Serialization(_) => {
            PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(e.to_string())
        }
        _ => PyErr::new::<pyo3::exceptions::PyValueError, _>(e.to_string()),
    }
}

/// Python wrapper for the Rust ledger tracker
///
/// # Example (from Python)
///
/// ```python
/// from fasset_ledger_core_rs import LedgerTracker
///
/// tracker = LedgerTracker.new(
///     {},  # settings: defaults
///     {"amg_token_price": 100_000, "usd5_token_price": 100_000},
///     {"amg_token_price": 100_000, "usd5_token_price": 100_000},
/// )
/// tracker.apply_event({
///     "type": "agent_created",
///     "agent_vault": "vault_1",
///     "owner": "owner_1",
///     "underlying_address": "UNDERLYING_1",
/// })
/// print(tracker.agent_info("vault_1")["status"])
/// ```
#[pyclass(name = "LedgerTracker")]
pub struct PyLedgerTracker {
    inner: LedgerTracker,
}

#[pymethods]
impl PyLedgerTracker {
    /// Create a tracker from settings and price dicts
    ///
    /// # Arguments
    ///
    /// * `settings` - Ledger settings; missing fields take the defaults
    /// * `class1_price` - Class-1 collateral quote
    /// * `pool_price` - Pool collateral quote
    ///
    /// # Errors
    ///
    /// Raises ValueError if a price field is missing or a type conversion
    /// fails
    #[staticmethod]
    fn new(settings: &PyDict, class1_price: &PyDict, pool_price: &PyDict) -> PyResult<Self> {
        let context = crate::models::LedgerContext::new(
            parse_settings(settings)?,
            parse_price(class1_price)?,
            parse_price(pool_price)?,
        );
        Ok(PyLedgerTracker {
            inner: LedgerTracker::new(context),
        })
    }

    /// Current ledger timestamp
    fn now(&self) -> u64 {
        self.inner.now()
    }

    /// Move the ledger clock forward
    fn advance_time(&mut self, seconds: u64) {
        self.inner.advance_time(seconds);
    }

    /// Install fresh oracle quotes
    fn update_prices(&mut self, class1_price: &PyDict, pool_price: &PyDict) -> PyResult<()> {
        self.inner
            .update_prices(parse_price(class1_price)?, parse_price(pool_price)?);
        Ok(())
    }

    /// Apply one chain event (dict with a `type` key)
    ///
    /// # Errors
    ///
    /// Raises ValueError if the event dict is malformed or the event is
    /// invalid against the current ledger state
    fn apply_event(&mut self, event: &PyDict) -> PyResult<()> {
        let event = parse_chain_event(event)?;
        self.inner.apply_event(&event).map_err(tracker_err)
    }

    /// Vault addresses of all registered agents, sorted
    fn agent_vaults(&self) -> Vec<String> {
        let mut vaults: Vec<String> = self
            .inner
            .state()
            .agents()
            .map(|a| a.vault().to_string())
            .collect();
        vaults.sort();
        vaults
    }

    /// Number of registered agents
    fn num_agents(&self) -> usize {
        self.inner.state().num_agents()
    }

    /// Headline figures for one agent
    ///
    /// Returns a dict with minted/reserved/redeeming totals, underlying
    /// balances, collateral and display collateral ratios.
    fn agent_info(&self, py: Python<'_>, agent_vault: &str) -> PyResult<Py<PyDict>> {
        let info = self.inner.agent_info(agent_vault).map_err(tracker_err)?;
        agent_info_to_py(py, &info)
    }

    /// Default a redemption against a non-existence proof
    ///
    /// Returns a dict with `paid_class1_wei` and `paid_pool_wei`.
    fn default_redemption(
        &mut self,
        py: Python<'_>,
        agent_vault: &str,
        request_id: u64,
        proof: &PyDict,
    ) -> PyResult<Py<PyDict>> {
        let proof = parse_nonexistence_proof(proof)?;
        let outcome = self
            .inner
            .default_redemption(agent_vault, request_id, &proof)
            .map_err(tracker_err)?;

        let dict = PyDict::new(py);
        dict.set_item("paid_class1_wei", outcome.paid_class1_wei)?;
        dict.set_item("paid_pool_wei", outcome.paid_pool_wei)?;
        Ok(dict.into())
    }

    /// Challenge a payment with no justifying reference
    ///
    /// Returns the reward paid to the challenger in class-1 wei.
    fn illegal_payment_challenge(
        &mut self,
        agent_vault: &str,
        challenger: &str,
        proof: &PyDict,
    ) -> PyResult<u128> {
        let proof = parse_payment_proof(proof)?;
        self.inner
            .illegal_payment_challenge(agent_vault, challenger, &proof)
            .map_err(tracker_err)
    }

    /// Challenge two payments carrying the same reference
    fn double_payment_challenge(
        &mut self,
        agent_vault: &str,
        challenger: &str,
        proof1: &PyDict,
        proof2: &PyDict,
    ) -> PyResult<u128> {
        let proof1 = parse_payment_proof(proof1)?;
        let proof2 = parse_payment_proof(proof2)?;
        self.inner
            .double_payment_challenge(agent_vault, challenger, &proof1, &proof2)
            .map_err(tracker_err)
    }

    /// Challenge a set of payments that overdraw the free balance
    fn free_balance_negative_challenge(
        &mut self,
        agent_vault: &str,
        challenger: &str,
        proofs: &PyList,
    ) -> PyResult<u128> {
        let mut parsed = Vec::with_capacity(proofs.len());
        for item in proofs.iter() {
            let proof_dict: &PyDict = item.downcast()?;
            parsed.push(parse_payment_proof(proof_dict)?);
        }
        self.inner
            .free_balance_negative_challenge(agent_vault, challenger, &parsed)
            .map_err(tracker_err)
    }

    /// Evaluate collateral ratios and advance the agent's status machine
    ///
    /// Returns `(from, to)` status strings when a transition happened,
    /// otherwise None.
    fn start_liquidation(&mut self, agent_vault: &str) -> PyResult<Option<(String, String)>> {
        let transition = self.inner.start_liquidation(agent_vault).map_err(tracker_err)?;
        Ok(transition.map(|(from, to)| {
            (status_to_str(from).to_string(), status_to_str(to).to_string())
        }))
    }

    /// Leave the call band or liquidation once both ratios are safe again
    fn end_liquidation(&mut self, agent_vault: &str) -> PyResult<()> {
        self.inner.end_liquidation(agent_vault).map_err(tracker_err)
    }

    /// Burn f-assets against a liquidating agent
    ///
    /// Returns a dict with `liquidated_uba`, `paid_class1_wei` and
    /// `paid_pool_wei`.
    fn liquidate(
        &mut self,
        py: Python<'_>,
        agent_vault: &str,
        liquidator: &str,
        amount_uba: u128,
    ) -> PyResult<Py<PyDict>> {
        let outcome = self
            .inner
            .liquidate(agent_vault, liquidator, amount_uba)
            .map_err(tracker_err)?;

        let dict = PyDict::new(py);
        dict.set_item("liquidated_uba", outcome.liquidated_uba)?;
        dict.set_item("paid_class1_wei", outcome.paid_class1_wei)?;
        dict.set_item("paid_pool_wei", outcome.paid_pool_wei)?;
        Ok(dict.into())
    }

    /// Announce the agent's wind-down; requires that it backs nothing
    fn announce_destroy(&mut self, agent_vault: &str) -> PyResult<()> {
        self.inner.announce_destroy(agent_vault).map_err(tracker_err)
    }

    /// Cross-check every agent's running totals against its books
    ///
    /// Returns a list of violation strings; empty means the ledger is
    /// consistent.
    fn check_invariants(&self) -> Vec<String> {
        self.inner.check_invariants()
    }

    /// Audit one agent's accounted backing against its real underlying
    /// holding
    fn check_underlying_backing(
        &self,
        agent_vault: &str,
        chain_balance_uba: u128,
    ) -> PyResult<Vec<String>> {
        self.inner
            .check_underlying_backing(agent_vault, chain_balance_uba)
            .map_err(tracker_err)
    }

    /// Drain the fact log, returning the facts as dicts in derivation order
    fn take_facts(&mut self, py: Python<'_>) -> PyResult<Py<PyList>> {
        let facts = self.inner.take_facts();
        let list = PyList::empty(py);
        for fact in &facts {
            list.append(fact_to_py(py, fact)?)?;
        }
        Ok(list.into())
    }

    /// Capture the complete tracker state as a JSON string
    fn snapshot_json(&self) -> PyResult<String> {
        let snapshot = self.inner.snapshot().map_err(tracker_err)?;
        serde_json::to_string(&snapshot).map_err(|e| {
            PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!(
                "Snapshot serialization failed: {}",
                e
            ))
        })
    }

    /// Rebuild a tracker from a snapshot taken with the same settings
    ///
    /// # Errors
    ///
    /// Raises ValueError if the JSON is malformed, the settings hash does
    /// not match, or the snapshot fails validation
    #[staticmethod]
    fn restore_json(snapshot_json: &str, settings: &PyDict) -> PyResult<Self> {
        let snapshot: LedgerSnapshot = serde_json::from_str(snapshot_json).map_err(|e| {
            PyErr::new::<pyo3::exceptions::PyValueError, _>(format!(
                "Invalid snapshot JSON: {}",
                e
            ))
        })?;
        let settings = parse_settings(settings)?;
        let inner = LedgerTracker::restore(snapshot, settings).map_err(tracker_err)?;
        Ok(PyLedgerTracker { inner })
    }
}
