//! BLE GATT Service Protocol Constants for the HTTP Proxy Service
//!
//! This module defines the service and characteristic UUIDs shared by the
//! peripheral (proxy) and central (requesting) sides.

use uuid::Uuid;

/// HPS Service UUID: 0136bd82-ba81-48c6-b608-df7aa274338a
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x0136bd82_ba81_48c6_b608_df7aa274338a);

/// HTTP URI Characteristic UUID, 0x2AB6 (write)
pub const URI_UUID: Uuid = sig_uuid(0x2AB6);

/// HTTP Headers Characteristic UUID, 0x2AB7 (read/write)
pub const HEADERS_UUID: Uuid = sig_uuid(0x2AB7);

/// HTTP Status Code Characteristic UUID, 0x2AB8
pub const STATUS_CODE_UUID: Uuid = sig_uuid(0x2AB8);

/// HTTP Entity Body Characteristic UUID, 0x2AB9 (read/write)
pub const BODY_UUID: Uuid = sig_uuid(0x2AB9);

/// HTTP Control Point Characteristic UUID, 0x2ABA (write/notify)
pub const CONTROL_POINT_UUID: Uuid = sig_uuid(0x2ABA);

/// Name the peripheral advertises and the central scans for
pub const DEVICE_NAME: &str = "HPS";

/// Max buffer size the HTTP headers encode into, otherwise HeadersTruncated
/// is reported
pub const HEADERS_MAX_OCTETS: usize = 512;

/// Max size of the HTTP body, otherwise BodyTruncated is reported
pub const BODY_MAX_OCTETS: usize = 512;

/// Expand a 16-bit SIG assigned number on the Bluetooth base UUID
/// (xxxxxxxx-0000-1000-8000-00805F9B34FB, Vol 3, Part B, 2.5.1)
pub const fn sig_uuid(short: u16) -> Uuid {
    Uuid::from_u128(((short as u128) << 96) | 0x0000_0000_0000_1000_8000_00805f9b34fb)
}
