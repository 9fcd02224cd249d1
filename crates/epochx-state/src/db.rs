use std::path::Path;

use epochx_core::error::ProverError;
use epochx_core::types::{Address, Epoch, ReservationId, U256};
use epochx_core::{BondReservation, ClaimRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

const CURSOR_KEY: &str = "epoch_cursor";
const NEXT_RESERVATION_KEY: &str = "next_reservation_id";

/// Persistent prover state backed by sled.
///
/// Named trees:
///   reservations — ReservationId (u64 BE) → bincode(BondReservation)
///   deposits     — prover Address bytes   → U256 (32 bytes BE)
///   claims       — Epoch (32 bytes BE)    → bincode(ClaimRecord)
///   meta         — utf8 key bytes         → raw bytes
pub struct StateDb {
    _db: sled::Db,
    reservations: sled::Tree,
    deposits: sled::Tree,
    claims: sled::Tree,
    meta: sled::Tree,
}

fn storage(e: sled::Error) -> ProverError {
    ProverError::Storage(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProverError> {
    bincode::serialize(value).map_err(|e| ProverError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProverError> {
    bincode::deserialize(bytes).map_err(|e| ProverError::Serialization(e.to_string()))
}

fn u256_from_slot(bytes: &[u8]) -> Result<U256, ProverError> {
    if bytes.len() != 32 {
        return Err(ProverError::Serialization(format!(
            "expected 32-byte integer, got {} bytes",
            bytes.len()
        )));
    }
    Ok(U256::from_be_slice(bytes))
}

impl StateDb {
    /// Open or create the state database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ProverError> {
        let db = sled::open(path).map_err(storage)?;
        let reservations = db.open_tree("reservations").map_err(storage)?;
        let deposits     = db.open_tree("deposits").map_err(storage)?;
        let claims       = db.open_tree("claims").map_err(storage)?;
        let meta         = db.open_tree("meta").map_err(storage)?;
        Ok(Self { _db: db, reservations, deposits, claims, meta })
    }

    // ── Bond ledger ──────────────────────────────────────────────────────────

    pub fn put_reservation(&self, reservation: &BondReservation) -> Result<(), ProverError> {
        self.reservations
            .insert(reservation.id.to_be_bytes(), encode(reservation)?)
            .map_err(storage)?;
        Ok(())
    }

    pub fn get_reservation(&self, id: ReservationId) -> Result<Option<BondReservation>, ProverError> {
        match self.reservations.get(id.to_be_bytes()).map_err(storage)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All reservations in id order.
    pub fn reservations(&self) -> Result<Vec<BondReservation>, ProverError> {
        let mut out = Vec::new();
        for item in self.reservations.iter() {
            let (_, value) = item.map_err(storage)?;
            out.push(decode(&value)?);
        }
        Ok(out)
    }

    pub fn put_deposit(&self, prover: &Address, amount: U256) -> Result<(), ProverError> {
        self.deposits
            .insert(prover.as_slice(), amount.to_be_bytes::<32>().to_vec())
            .map_err(storage)?;
        Ok(())
    }

    pub fn deposits(&self) -> Result<Vec<(Address, U256)>, ProverError> {
        let mut out = Vec::new();
        for item in self.deposits.iter() {
            let (key, value) = item.map_err(storage)?;
            if key.len() != 20 {
                return Err(ProverError::Serialization(format!(
                    "deposit key of {} bytes",
                    key.len()
                )));
            }
            out.push((Address::from_slice(&key), u256_from_slot(&value)?));
        }
        Ok(out)
    }

    pub fn put_next_reservation_id(&self, next: u64) -> Result<(), ProverError> {
        self.put_meta(NEXT_RESERVATION_KEY, &next.to_be_bytes())
    }

    pub fn get_next_reservation_id(&self) -> Result<Option<u64>, ProverError> {
        match self.get_meta(NEXT_RESERVATION_KEY)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    ProverError::Serialization("next reservation id is not 8 bytes".into())
                })?;
                Ok(Some(u64::from_be_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    // ── Claims ───────────────────────────────────────────────────────────────

    pub fn put_claim(&self, record: &ClaimRecord) -> Result<(), ProverError> {
        self.claims
            .insert(record.epoch.to_be_bytes::<32>(), encode(record)?)
            .map_err(storage)?;
        debug!(epoch = %record.epoch, status = ?record.status, "persisted claim record");
        Ok(())
    }

    pub fn get_claim(&self, epoch: &Epoch) -> Result<Option<ClaimRecord>, ProverError> {
        match self.claims.get(epoch.to_be_bytes::<32>()).map_err(storage)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn remove_claim(&self, epoch: &Epoch) -> Result<(), ProverError> {
        self.claims.remove(epoch.to_be_bytes::<32>()).map_err(storage)?;
        debug!(epoch = %epoch, "removed claim record");
        Ok(())
    }

    /// All claim records in epoch order (keys are big-endian).
    pub fn claims(&self) -> Result<Vec<ClaimRecord>, ProverError> {
        let mut out = Vec::new();
        for item in self.claims.iter() {
            let (_, value) = item.map_err(storage)?;
            out.push(decode(&value)?);
        }
        Ok(out)
    }

    // ── Epoch progress cursor ────────────────────────────────────────────────

    pub fn put_cursor(&self, epoch: &Epoch) -> Result<(), ProverError> {
        self.put_meta(CURSOR_KEY, &epoch.to_be_bytes::<32>())
    }

    pub fn get_cursor(&self) -> Result<Option<Epoch>, ProverError> {
        self.get_meta(CURSOR_KEY)?
            .map(|bytes| u256_from_slot(&bytes))
            .transpose()
    }

    // ── Meta ─────────────────────────────────────────────────────────────────

    pub fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), ProverError> {
        self.meta.insert(key.as_bytes(), value).map_err(storage)?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, ProverError> {
        self.meta
            .get(key.as_bytes())
            .map(|v| v.map(|iv| iv.to_vec()))
            .map_err(storage)
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), ProverError> {
        self._db.flush().map_err(storage)?;
        Ok(())
    }
}
