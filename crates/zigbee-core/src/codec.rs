//! Attribute codec
//!
//! Converts raw cluster attribute payloads into semantic values and back.
//! Every adapter decodes through here; vendor deviations are expressed as
//! parameters ([`Polarity`], [`Measurement`]) instead of separate code paths.
//!
//! A decode failure means the report must be dropped without touching any
//! state.

use thiserror::Error;

use crate::cluster::{Attribute, DataType};
use crate::color::{xy_to_rgb, Rgb, Xy};

/// Codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Attribute {attribute:#06x} has an empty payload")]
    Empty { attribute: u16 },

    #[error("Attribute {attribute:#06x}: expected {expected}, got {actual:?}")]
    TypeMismatch {
        attribute: u16,
        expected: &'static str,
        actual: DataType,
    },

    #[error("Attribute {attribute:#06x}: payload too short ({actual} of {expected} bytes)")]
    Truncated {
        attribute: u16,
        expected: usize,
        actual: usize,
    },

    #[error("Attribute {attribute:#06x}: {reason}")]
    Malformed { attribute: u16, reason: String },
}

/// How a device family encodes its boolean On/Off attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarity {
    /// 0 = false, anything else = true
    #[default]
    Normal,
    /// 0 = true (Lumi/Xiaomi contacts and buttons report "closed"/"pressed" as 0)
    Inverted,
}

impl Polarity {
    #[must_use]
    pub fn apply(self, raw: bool) -> bool {
        match self {
            Self::Normal => raw,
            Self::Inverted => !raw,
        }
    }
}

fn payload<'a>(attribute: &'a Attribute, len: usize) -> Result<&'a [u8], DecodeError> {
    if attribute.data.is_empty() {
        return Err(DecodeError::Empty {
            attribute: attribute.id,
        });
    }
    if attribute.data.len() < len {
        return Err(DecodeError::Truncated {
            attribute: attribute.id,
            expected: len,
            actual: attribute.data.len(),
        });
    }
    Ok(&attribute.data[..len])
}

fn mismatch(attribute: &Attribute, expected: &'static str) -> DecodeError {
    DecodeError::TypeMismatch {
        attribute: attribute.id,
        expected,
        actual: attribute.data_type,
    }
}

/// Decode a boolean attribute honoring the family polarity
pub fn decode_bool(attribute: &Attribute, polarity: Polarity) -> Result<bool, DecodeError> {
    if attribute.data_type != DataType::Boolean {
        return Err(mismatch(attribute, "boolean"));
    }
    let data = payload(attribute, 1)?;
    Ok(polarity.apply(data[0] != 0))
}

/// Decode any 8-bit unsigned, enum, bitmap or raw data attribute
pub fn decode_u8(attribute: &Attribute) -> Result<u8, DecodeError> {
    match attribute.data_type {
        DataType::Uint8 | DataType::Enum8 | DataType::Bitmap8 | DataType::Data8 => {
            Ok(payload(attribute, 1)?[0])
        }
        _ => Err(mismatch(attribute, "8-bit unsigned")),
    }
}

/// Decode any 16-bit unsigned, enum, bitmap or raw data attribute
pub fn decode_u16(attribute: &Attribute) -> Result<u16, DecodeError> {
    match attribute.data_type {
        DataType::Uint16 | DataType::Enum16 | DataType::Bitmap16 | DataType::Data16 => {
            let data = payload(attribute, 2)?;
            Ok(u16::from_le_bytes([data[0], data[1]]))
        }
        _ => Err(mismatch(attribute, "16-bit unsigned")),
    }
}

pub fn decode_i16(attribute: &Attribute) -> Result<i16, DecodeError> {
    if attribute.data_type != DataType::Int16 {
        return Err(mismatch(attribute, "16-bit signed"));
    }
    let data = payload(attribute, 2)?;
    Ok(i16::from_le_bytes([data[0], data[1]]))
}

/// Decode a length-prefixed character string
pub fn decode_string(attribute: &Attribute) -> Result<String, DecodeError> {
    if attribute.data_type != DataType::CharString {
        return Err(mismatch(attribute, "character string"));
    }
    let len = usize::from(payload(attribute, 1)?[0]);
    let data = payload(attribute, 1 + len)?;
    Ok(String::from_utf8_lossy(&data[1..]).trim_end_matches('\0').to_string())
}

/// 0-255 level to a rounded percentage
#[must_use]
pub fn level_to_percentage(level: u8) -> u8 {
    ((u32::from(level) * 100 + 127) / 255) as u8
}

/// Percentage to a rounded 0-255 level, values above 100 are clamped
#[must_use]
pub fn percentage_to_level(percentage: u8) -> u8 {
    let pct = u32::from(percentage.min(100));
    ((pct * 255 + 50) / 100) as u8
}

/// Link quality indicator to a signal strength percentage
#[must_use]
pub fn lqi_to_percentage(lqi: u8) -> u8 {
    level_to_percentage(lqi)
}

/// Decode LevelControl CurrentLevel into a percentage
pub fn decode_level_percentage(attribute: &Attribute) -> Result<u8, DecodeError> {
    decode_u8(attribute).map(level_to_percentage)
}

/// Measurement clusters reporting a MeasuredValue in scaled integer units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measurement {
    /// int16, hundredths of a degree Celsius
    Temperature,
    /// uint16, hundredths of a percent
    Humidity,
    /// int16, divided by 100 like the other measurements
    Pressure,
}

impl Measurement {
    /// Divisor applied to the raw value
    #[must_use]
    pub fn divisor(self) -> f64 {
        match self {
            Self::Temperature | Self::Humidity | Self::Pressure => 100.0,
        }
    }

    /// Decode a MeasuredValue attribute into its unit value
    pub fn decode(self, attribute: &Attribute) -> Result<f64, DecodeError> {
        let raw = match self {
            Self::Temperature | Self::Pressure => f64::from(decode_i16(attribute)?),
            Self::Humidity => f64::from(decode_u16(attribute)?),
        };
        Ok(raw / self.divisor())
    }
}

/// Occupancy bitmap, bit 0 set when occupied
pub fn decode_occupancy(attribute: &Attribute) -> Result<bool, DecodeError> {
    if attribute.data_type != DataType::Bitmap8 && attribute.data_type != DataType::Uint8 {
        return Err(mismatch(attribute, "8-bit bitmap"));
    }
    Ok(payload(attribute, 1)?[0] & 0x01 != 0)
}

/// Illuminance reported by the device, taken as lux
pub fn decode_illuminance(attribute: &Attribute) -> Result<u16, DecodeError> {
    decode_u16(attribute)
}

/// IAS Zone status bitmap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ZoneStatus(pub u16);

impl ZoneStatus {
    #[must_use]
    pub fn alarm1(self) -> bool {
        self.0 & 0x0001 != 0
    }

    #[must_use]
    pub fn alarm2(self) -> bool {
        self.0 & 0x0002 != 0
    }

    #[must_use]
    pub fn battery_low(self) -> bool {
        self.0 & 0x0008 != 0
    }

    /// Parse the payload of a zone status change notification command
    pub fn from_notification(payload: &[u8]) -> Result<Self, DecodeError> {
        match payload {
            [lo, hi, ..] => Ok(Self(u16::from_le_bytes([*lo, *hi]))),
            _ => Err(DecodeError::Truncated {
                attribute: crate::cluster::ias_zone_attrs::ZONE_STATUS,
                expected: 2,
                actual: payload.len(),
            }),
        }
    }
}

pub fn decode_zone_status(attribute: &Attribute) -> Result<ZoneStatus, DecodeError> {
    decode_u16(attribute).map(ZoneStatus)
}

/// Battery below this percentage is reported as critical
pub const BATTERY_CRITICAL_PERCENTAGE: u8 = 10;

/// BatteryPercentageRemaining is reported in half percent steps
pub fn decode_battery_percentage(attribute: &Attribute) -> Result<u8, DecodeError> {
    decode_u8(attribute).map(|raw| (raw / 2).min(100))
}

/// Battery voltage mapped to an empty battery (CR2032 under load)
pub const LUMI_BATTERY_MIN_MV: u16 = 2850;
/// Battery voltage mapped to a full battery
pub const LUMI_BATTERY_MAX_MV: u16 = 3200;

const LUMI_TAG_BATTERY_VOLTAGE: u8 = 0x01;

/// Extract the battery voltage (mV) from the Lumi 0xFF01 status report
///
/// The attribute is a string of `tag, data type, value` records.
pub fn decode_lumi_battery_voltage(attribute: &Attribute) -> Result<u16, DecodeError> {
    if attribute.data_type != DataType::CharString && attribute.data_type != DataType::OctetString
    {
        return Err(mismatch(attribute, "string"));
    }
    let len = usize::from(payload(attribute, 1)?[0]);
    let data = &payload(attribute, 1 + len)?[1..];

    let malformed = |reason: &str| DecodeError::Malformed {
        attribute: attribute.id,
        reason: reason.to_string(),
    };

    let mut idx = 0;
    while idx + 2 <= data.len() {
        let tag = data[idx];
        let data_type = DataType::from_u8(data[idx + 1])
            .ok_or_else(|| malformed("unknown record data type"))?;
        let size = data_type
            .fixed_size()
            .ok_or_else(|| malformed("variable length record"))?;
        idx += 2;
        if idx + size > data.len() {
            return Err(malformed("record exceeds payload"));
        }
        if tag == LUMI_TAG_BATTERY_VOLTAGE && data_type == DataType::Uint16 {
            return Ok(u16::from_le_bytes([data[idx], data[idx + 1]]));
        }
        idx += size;
    }

    Err(malformed("no battery voltage record"))
}

/// Map a Lumi battery voltage onto a percentage
#[must_use]
pub fn lumi_voltage_to_percentage(millivolts: u16) -> u8 {
    let clamped = millivolts.clamp(LUMI_BATTERY_MIN_MV, LUMI_BATTERY_MAX_MV);
    let span = u32::from(LUMI_BATTERY_MAX_MV - LUMI_BATTERY_MIN_MV);
    let above = u32::from(clamped - LUMI_BATTERY_MIN_MV);
    ((above * 100 + span / 2) / span) as u8
}

/// Default color temperature range for devices without queryable limits
pub const DEFAULT_MIN_MIREDS: u16 = 250;
pub const DEFAULT_MAX_MIREDS: u16 = 450;

/// Supported color temperature range of a light, in mireds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiredRange {
    pub min: u16,
    pub max: u16,
}

impl Default for MiredRange {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_MIREDS,
            max: DEFAULT_MAX_MIREDS,
        }
    }
}

impl MiredRange {
    /// Range from the physical min/max attributes, ignoring nonsense values
    #[must_use]
    pub fn from_physical(min: Option<u16>, max: Option<u16>) -> Self {
        match (min, max) {
            (Some(min), Some(max)) if min > 0 && min < max && max != 0xFFFF => Self { min, max },
            _ => Self::default(),
        }
    }

    #[must_use]
    pub fn clamp(&self, mireds: u16) -> u16 {
        mireds.clamp(self.min, self.max)
    }
}

/// Buffers CurrentX / CurrentY until both halves of a color arrived
///
/// Emits exactly one color per X/Y pair, then starts over, so a color is
/// never built from a stale X and a fresh Y.
#[derive(Debug, Default)]
pub struct ColorXyAccumulator {
    x: Option<u16>,
    y: Option<u16>,
}

impl ColorXyAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_x(&mut self, x: u16) -> Option<Rgb> {
        self.x = Some(x);
        self.take()
    }

    pub fn push_y(&mut self, y: u16) -> Option<Rgb> {
        self.y = Some(y);
        self.take()
    }

    /// Number of halves currently buffered
    #[must_use]
    pub fn received(&self) -> usize {
        usize::from(self.x.is_some()) + usize::from(self.y.is_some())
    }

    pub fn reset(&mut self) {
        self.x = None;
        self.y = None;
    }

    fn take(&mut self) -> Option<Rgb> {
        match (self.x, self.y) {
            (Some(x), Some(y)) => {
                self.reset();
                Some(xy_to_rgb(Xy::from_fixed(x, y)))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{basic_attrs, on_off_attrs};

    #[test]
    fn boolean_polarity() {
        for raw in 0u8..=255 {
            let attr = Attribute::new(on_off_attrs::ON_OFF, DataType::Boolean, vec![raw]);
            assert_eq!(decode_bool(&attr, Polarity::Normal), Ok(raw != 0));
            assert_eq!(decode_bool(&attr, Polarity::Inverted), Ok(raw == 0));
        }
    }

    #[test]
    fn boolean_rejects_wrong_type_and_empty_payload() {
        let wrong = Attribute::uint8(on_off_attrs::ON_OFF, 1);
        assert!(matches!(
            decode_bool(&wrong, Polarity::Normal),
            Err(DecodeError::TypeMismatch { .. })
        ));
        let empty = Attribute::new(on_off_attrs::ON_OFF, DataType::Boolean, Vec::new());
        assert_eq!(
            decode_bool(&empty, Polarity::Normal),
            Err(DecodeError::Empty { attribute: 0 })
        );
    }

    #[test]
    fn level_percentages() {
        assert_eq!(level_to_percentage(0), 0);
        assert_eq!(level_to_percentage(255), 100);
        assert_eq!(level_to_percentage(128), 50);
        for level in 0u8..=255 {
            let expected = (f64::from(level) * 100.0 / 255.0).round() as u8;
            assert_eq!(level_to_percentage(level), expected, "level {level}");
        }
    }

    #[test]
    fn percentage_to_level_inverts() {
        assert_eq!(percentage_to_level(0), 0);
        assert_eq!(percentage_to_level(50), 128);
        assert_eq!(percentage_to_level(100), 255);
        assert_eq!(percentage_to_level(150), 255);
        for pct in 0u8..=100 {
            assert_eq!(level_to_percentage(percentage_to_level(pct)), pct);
        }
    }

    #[test]
    fn measurements_are_scaled() {
        let temp = Attribute::int16(0, -1250);
        assert!((Measurement::Temperature.decode(&temp).unwrap() + 12.5).abs() < 1e-9);
        let humidity = Attribute::uint16(0, 4567);
        assert!((Measurement::Humidity.decode(&humidity).unwrap() - 45.67).abs() < 1e-9);
        let pressure = Attribute::int16(0, 1013);
        assert!((Measurement::Pressure.decode(&pressure).unwrap() - 10.13).abs() < 1e-9);
        assert!(Measurement::Humidity.decode(&temp).is_err());
    }

    #[test]
    fn truncated_u16_is_rejected() {
        let attr = Attribute::new(0, DataType::Uint16, vec![0x01]);
        assert_eq!(
            decode_u16(&attr),
            Err(DecodeError::Truncated {
                attribute: 0,
                expected: 2,
                actual: 1,
            })
        );
    }

    #[test]
    fn zone_status_bits() {
        let status = ZoneStatus::from_notification(&[0x09, 0x00, 0x00, 0x00]).unwrap();
        assert!(status.alarm1());
        assert!(status.battery_low());
        assert!(!status.alarm2());
        assert!(ZoneStatus::from_notification(&[0x01]).is_err());
    }

    #[test]
    fn battery_percentage_is_halved() {
        assert_eq!(decode_battery_percentage(&Attribute::uint8(0x21, 200)), Ok(100));
        assert_eq!(decode_battery_percentage(&Attribute::uint8(0x21, 17)), Ok(8));
        assert_eq!(decode_battery_percentage(&Attribute::uint8(0x21, 255)), Ok(100));
    }

    #[test]
    fn lumi_report_battery_voltage() {
        // tag 0x01 uint16 3045 mV, tag 0x03 int8 temperature
        let records = [0x01, 0x21, 0xE5, 0x0B, 0x03, 0x28, 0x1E];
        let mut data = vec![records.len() as u8];
        data.extend_from_slice(&records);
        let attr = Attribute::new(basic_attrs::LUMI_REPORT, DataType::CharString, data);
        assert_eq!(decode_lumi_battery_voltage(&attr), Ok(3045));
        assert_eq!(lumi_voltage_to_percentage(3045), 56);
        assert_eq!(lumi_voltage_to_percentage(2500), 0);
        assert_eq!(lumi_voltage_to_percentage(3300), 100);
    }

    #[test]
    fn lumi_report_without_voltage() {
        let data = vec![0x03, 0x03, 0x28, 0x1E];
        let attr = Attribute::new(basic_attrs::LUMI_REPORT, DataType::CharString, data);
        assert!(matches!(
            decode_lumi_battery_voltage(&attr),
            Err(DecodeError::Malformed { .. })
        ));
    }

    #[test]
    fn mired_range_defaults_and_clamps() {
        let range = MiredRange::from_physical(None, Some(500));
        assert_eq!(range, MiredRange { min: 250, max: 450 });
        assert_eq!(range.clamp(100), 250);
        assert_eq!(range.clamp(600), 450);
        let device = MiredRange::from_physical(Some(153), Some(370));
        assert_eq!(device.clamp(100), 153);
        assert_eq!(device.clamp(300), 300);
    }

    #[test]
    fn xy_pair_emits_once() {
        let mut acc = ColorXyAccumulator::new();
        assert!(acc.push_x(0x4000).is_none());
        assert_eq!(acc.received(), 1);
        assert!(acc.push_y(0x4000).is_some());
        assert_eq!(acc.received(), 0);
        // Lone X after a completed pair waits for its Y
        assert!(acc.push_x(0x5000).is_none());
        assert!(acc.push_y(0x3000).is_some());
    }

    #[test]
    fn yx_order_also_emits_once() {
        let mut acc = ColorXyAccumulator::new();
        assert!(acc.push_y(0x5000).is_none());
        assert!(acc.push_x(0x3000).is_some());
        assert!(acc.push_x(0x3000).is_none());
    }

    #[test]
    fn string_decoding() {
        let mut data = vec![18];
        data.extend_from_slice(b"lumi.sensor_magnet");
        let attr = Attribute::new(basic_attrs::MODEL_IDENTIFIER, DataType::CharString, data);
        assert_eq!(decode_string(&attr).unwrap(), "lumi.sensor_magnet");
    }
}
