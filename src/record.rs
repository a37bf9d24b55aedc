use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::fmt;

/// Source column names. The same names are used for the destination columns and the
/// duplicates file header.
pub mod columns {
    pub const PICKUP_DATETIME: &str = "tpep_pickup_datetime";
    pub const DROPOFF_DATETIME: &str = "tpep_dropoff_datetime";
    pub const PASSENGER_COUNT: &str = "passenger_count";
    pub const TRIP_DISTANCE: &str = "trip_distance";
    pub const STORE_AND_FWD_FLAG: &str = "store_and_fwd_flag";
    pub const PU_LOCATION_ID: &str = "PULocationID";
    pub const DO_LOCATION_ID: &str = "DOLocationID";
    pub const FARE_AMOUNT: &str = "fare_amount";
    pub const TIP_AMOUNT: &str = "tip_amount";

    pub const ALL: [&str; 9] = [
        PICKUP_DATETIME,
        DROPOFF_DATETIME,
        PASSENGER_COUNT,
        TRIP_DISTANCE,
        STORE_AND_FWD_FLAG,
        PU_LOCATION_ID,
        DO_LOCATION_ID,
        FARE_AMOUNT,
        TIP_AMOUNT,
    ];
}

/// One validated taxi trip.
///
/// Serialized field order and names match the duplicates file header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    #[serde(rename = "tpep_pickup_datetime")]
    pub pickup_time: DateTime<Utc>,
    #[serde(rename = "tpep_dropoff_datetime")]
    pub dropoff_time: DateTime<Utc>,
    pub passenger_count: u32,
    pub trip_distance: f64,
    pub store_and_fwd_flag: StoreAndFwdFlag,
    #[serde(rename = "PULocationID")]
    pub pickup_location_id: i32,
    #[serde(rename = "DOLocationID")]
    pub dropoff_location_id: i32,
    pub fare_amount: Decimal,
    pub tip_amount: Decimal,
}

impl Record {
    /// Business key used for duplicate detection
    pub fn key(&self) -> TripKey {
        TripKey {
            pickup_time: self.pickup_time,
            dropoff_time: self.dropoff_time,
            passenger_count: self.passenger_count,
        }
    }
}

/// Identity of a trip for deduplication. Distance, fare and locations are not part of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TripKey {
    pub pickup_time: DateTime<Utc>,
    pub dropoff_time: DateTime<Utc>,
    pub passenger_count: u32,
}

/// Normalized store-and-forward flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreAndFwdFlag {
    Yes,
    No,
    /// Unrecognized codes are kept (trimmed and uppercased) rather than rejected
    Other(String),
}

impl StoreAndFwdFlag {
    /// Normalize a raw source code: `Y` becomes `Yes`, `N` becomes `No`, anything else
    /// passes through.
    pub fn normalize(raw: &str) -> Self {
        let code = raw.trim().to_uppercase();
        match code.as_str() {
            "Y" => StoreAndFwdFlag::Yes,
            "N" => StoreAndFwdFlag::No,
            _ => StoreAndFwdFlag::Other(code),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StoreAndFwdFlag::Yes => "Yes",
            StoreAndFwdFlag::No => "No",
            StoreAndFwdFlag::Other(code) => code,
        }
    }
}

impl fmt::Display for StoreAndFwdFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for StoreAndFwdFlag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
