// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Continuation points for paged results.
//!
//! ```text
//!  register(2, [a b c d e]) ─► [a b]  + T1      stored: T1 → [c d e]
//!  get_next(T1)             ─► [c d]  + T2      stored: T2 → [e]
//!  get_next(T2)             ─► [e]    + null    stored: -
//!  get_next(T2)             ─► BadContinuationPointInvalid
//! ```
//!
//! Tokens are random, single-use and do not survive a restart.

use std::collections::HashMap;
use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uasrv_core::ContinuationError;

/// Number of random bytes in a token.
const TOKEN_BYTES: usize = 16;

/// Opaque continuation point token.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ContinuationPoint(Vec<u8>);

impl ContinuationPoint {
    fn generate() -> Self {
        let mut bytes = vec![0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wraps raw token bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the raw token bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ContinuationPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&BASE64.encode(&self.0))
    }
}

impl fmt::Debug for ContinuationPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContinuationPoint({self})")
    }
}

impl Serialize for ContinuationPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ContinuationPoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Token for the next page. `None` when the results are complete.
    pub continuation_point: Option<ContinuationPoint>,
    /// The values of this page.
    pub values: Vec<T>,
}

#[derive(Debug)]
struct StoredPoint<T> {
    max_elements: usize,
    remaining: Vec<T>,
}

/// Stores the unreturned remainder of paged results.
#[derive(Debug)]
pub struct ContinuationPointManager<T> {
    points: HashMap<ContinuationPoint, StoredPoint<T>>,
    max_points: usize,
}

impl<T> ContinuationPointManager<T> {
    /// Creates a manager holding at most `max_points` stored remainders.
    pub fn new(max_points: usize) -> Self {
        Self {
            points: HashMap::new(),
            max_points,
        }
    }

    /// Returns the number of stored continuation points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Pages `values`. With `max_elements` of 0, or when everything fits, the
    /// whole set is returned without a token.
    pub fn register(&mut self, max_elements: usize, mut values: Vec<T>) -> Result<Page<T>, ContinuationError> {
        if max_elements == 0 || values.len() <= max_elements {
            return Ok(Page {
                continuation_point: None,
                values,
            });
        }
        if self.points.len() >= self.max_points {
            return Err(ContinuationError::NoContinuationPoints {
                max: self.max_points,
            });
        }

        let remaining = values.split_off(max_elements);
        let token = self.store(max_elements, remaining);
        Ok(Page {
            continuation_point: Some(token),
            values,
        })
    }

    /// Returns the next page. The presented token is consumed.
    pub fn get_next(&mut self, token: &ContinuationPoint) -> Result<Page<T>, ContinuationError> {
        let StoredPoint {
            max_elements,
            mut remaining,
        } = self.points.remove(token).ok_or(ContinuationError::Invalid)?;

        if remaining.len() <= max_elements {
            return Ok(Page {
                continuation_point: None,
                values: remaining,
            });
        }

        let rest = remaining.split_off(max_elements);
        let next = self.store(max_elements, rest);
        Ok(Page {
            continuation_point: Some(next),
            values: remaining,
        })
    }

    /// Discards a stored remainder.
    pub fn cancel(&mut self, token: &ContinuationPoint) -> Result<(), ContinuationError> {
        self.points
            .remove(token)
            .map(|_| ())
            .ok_or(ContinuationError::Invalid)
    }

    /// Discards everything.
    pub fn clear(&mut self) {
        self.points.clear();
    }

    fn store(&mut self, max_elements: usize, remaining: Vec<T>) -> ContinuationPoint {
        let mut token = ContinuationPoint::generate();
        while self.points.contains_key(&token) {
            token = ContinuationPoint::generate();
        }
        self.points.insert(
            token.clone(),
            StoredPoint {
                max_elements,
                remaining,
            },
        );
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paging_sequence() {
        let mut manager = ContinuationPointManager::new(4);

        let first = manager.register(2, vec!['a', 'b', 'c', 'd', 'e']).unwrap();
        assert_eq!(first.values, vec!['a', 'b']);
        let t1 = first.continuation_point.unwrap();

        let second = manager.get_next(&t1).unwrap();
        assert_eq!(second.values, vec!['c', 'd']);
        let t2 = second.continuation_point.unwrap();
        assert_ne!(t1, t2);

        let third = manager.get_next(&t2).unwrap();
        assert_eq!(third.values, vec!['e']);
        assert!(third.continuation_point.is_none());

        assert!(matches!(manager.get_next(&t2), Err(ContinuationError::Invalid)));
        assert!(matches!(manager.get_next(&t1), Err(ContinuationError::Invalid)));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_unlimited_and_fitting_sets() {
        let mut manager = ContinuationPointManager::new(4);
        let page = manager.register(0, vec![1, 2, 3]).unwrap();
        assert!(page.continuation_point.is_none());
        assert_eq!(page.values.len(), 3);

        let page = manager.register(3, vec![1, 2, 3]).unwrap();
        assert!(page.continuation_point.is_none());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_cancel() {
        let mut manager = ContinuationPointManager::new(4);
        let token = manager
            .register(1, vec![1, 2])
            .unwrap()
            .continuation_point
            .unwrap();
        manager.cancel(&token).unwrap();
        assert!(matches!(manager.cancel(&token), Err(ContinuationError::Invalid)));
        assert!(matches!(
            manager.cancel(&ContinuationPoint::from_bytes(vec![0; 16])),
            Err(ContinuationError::Invalid)
        ));
    }

    #[test]
    fn test_point_limit() {
        let mut manager = ContinuationPointManager::new(1);
        manager.register(1, vec![1, 2]).unwrap();
        assert!(matches!(
            manager.register(1, vec![1, 2]),
            Err(ContinuationError::NoContinuationPoints { max: 1 })
        ));
    }

    #[test]
    fn test_token_serde() {
        let token = ContinuationPoint::from_bytes(vec![1, 2, 3]);
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(json, "\"AQID\"");
        let back: ContinuationPoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, token);
    }
}
