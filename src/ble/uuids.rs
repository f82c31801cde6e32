//! BLE Service and Characteristic UUIDs.
//!
//! Contains the fixed identifiers of the QBike Lock GATT profile.

use uuid::Uuid;

/// Name the lock advertises. Discovery matches it exactly.
pub const LOCK_DEVICE_NAME: &str = "QBike Lock";

/// Lock data service UUID.
pub const DATA_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1548_1212_efde_1523_785feabcd123);
/// Status characteristic UUID (read).
pub const READ_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000_1528_1212_efde_1523_785feabcd123);
/// Command characteristic UUID (write with response).
pub const WRITE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000_1526_1212_efde_1523_785feabcd123);
