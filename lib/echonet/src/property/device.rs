//! Device object super class properties (EPC 0x80..0x9F). These apply to
//! every device class, so their decoders resolve before any class-specific
//! catalogue.

use crate::error::CodecError;
use crate::property::{property_map, Property};
use byteorder::{BigEndian, ReadBytesExt};
use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use std::io::Cursor;

/// Operating status (0x80): 0x30 on, 0x31 off.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct OpStatus {
    pub on: bool,
}

impl OpStatus {
    pub fn decode(data: &[u8]) -> Result<OpStatus, CodecError> {
        expect_len(data, 1)?;
        Ok(OpStatus { on: data[0] == 0x30 })
    }

    pub fn encode(&self) -> Vec<u8> {
        vec![if self.on { 0x30 } else { 0x31 }]
    }
}

/// Fixed installation location codes for the 1 byte bitfield form.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LocationCode {
    LivingRoom = 0b0001,
    DiningRoom = 0b0010,
    Kitchen = 0b0011,
    Bathroom = 0b0100,
    Toilet = 0b0101,
    Washroom = 0b0110,
    Hallway = 0b0111,
    Room = 0b1000,
    Stairs = 0b1001,
    Entrance = 0b1010,
    Storage = 0b1011,
    Garden = 0b1100,
    Garage = 0b1101,
    Balcony = 0b1110,
    Other = 0b1111,
}

impl LocationCode {
    pub fn from_u8(code: u8) -> Option<LocationCode> {
        match code {
            0b0001 => Some(LocationCode::LivingRoom),
            0b0010 => Some(LocationCode::DiningRoom),
            0b0011 => Some(LocationCode::Kitchen),
            0b0100 => Some(LocationCode::Bathroom),
            0b0101 => Some(LocationCode::Toilet),
            0b0110 => Some(LocationCode::Washroom),
            0b0111 => Some(LocationCode::Hallway),
            0b1000 => Some(LocationCode::Room),
            0b1001 => Some(LocationCode::Stairs),
            0b1010 => Some(LocationCode::Entrance),
            0b1011 => Some(LocationCode::Storage),
            0b1100 => Some(LocationCode::Garden),
            0b1101 => Some(LocationCode::Garage),
            0b1110 => Some(LocationCode::Balcony),
            0b1111 => Some(LocationCode::Other),
            _ => None,
        }
    }
}

const LOCATION_NOT_SET: u8 = 0x00;
const LOCATION_POSITION: u8 = 0x01;
const LOCATION_UNDEFINED: u8 = 0xFF;

/// Installation location (0x81). Either a 1 byte encoded spot, one of the
/// special codes, or the 17 byte position information variant.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum InstallLocation {
    Spot { code: LocationCode, number: u8, free_defined: bool },
    NotSet,
    Undefined,
    Position(Vec<u8>),
}

impl InstallLocation {
    pub fn decode(data: &[u8]) -> Result<InstallLocation, CodecError> {
        if data.is_empty() {
            return Err(CodecError::Length { expected: 1, got: 0 });
        }

        match data[0] {
            LOCATION_POSITION => {
                expect_len(data, 17)?;
                Ok(InstallLocation::Position(data[1..17].to_vec()))
            }
            LOCATION_NOT_SET => Ok(InstallLocation::NotSet),
            LOCATION_UNDEFINED => Ok(InstallLocation::Undefined),
            bits => {
                expect_len(data, 1)?;
                let code = LocationCode::from_u8((bits & 0b0111_1000) >> 3)
                    .ok_or(CodecError::Value("unknown location code"))?;
                Ok(InstallLocation::Spot {
                    code,
                    number: bits & 0b0000_0111,
                    free_defined: bits & 0b1000_0000 != 0,
                })
            }
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        match self {
            InstallLocation::Spot { code, number, free_defined } => {
                if *number > 7 {
                    return Err(CodecError::Value("location number above 7"));
                }
                let free = if *free_defined { 0b1000_0000 } else { 0 };
                Ok(vec![free | ((*code as u8) << 3) | number])
            }
            InstallLocation::NotSet => Ok(vec![LOCATION_NOT_SET]),
            InstallLocation::Undefined => Ok(vec![LOCATION_UNDEFINED]),
            InstallLocation::Position(info) => {
                if info.len() != 16 {
                    return Err(CodecError::Value("position information must be 16 bytes"));
                }
                let mut out = Vec::with_capacity(17);
                out.push(LOCATION_POSITION);
                out.extend_from_slice(info);
                Ok(out)
            }
        }
    }
}

/// Standard version information (0x82).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct VersionInfo {
    pub release: char,
    pub revision: u8,
}

impl VersionInfo {
    pub fn decode(data: &[u8]) -> Result<VersionInfo, CodecError> {
        expect_at_least(data, 4)?;
        Ok(VersionInfo { release: data[2] as char, revision: data[3] })
    }

    pub fn encode(&self) -> Vec<u8> {
        vec![0x00, 0x00, self.release as u8, self.revision]
    }
}

/// Instantaneous power consumption (0x84), watts.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct InstantPowerConsumption {
    pub value: u32,
}

impl InstantPowerConsumption {
    pub fn decode(data: &[u8]) -> Result<InstantPowerConsumption, CodecError> {
        expect_len(data, 4)?;
        Ok(InstantPowerConsumption { value: Cursor::new(data).read_u32::<BigEndian>()? })
    }

    pub fn encode(&self) -> Vec<u8> {
        self.value.to_be_bytes().to_vec()
    }
}

/// Cumulative power consumption (0x85), kWh with 1 Wh resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CumulativePowerConsumption {
    pub value: f64,
}

impl CumulativePowerConsumption {
    pub fn decode(data: &[u8]) -> Result<CumulativePowerConsumption, CodecError> {
        expect_len(data, 4)?;
        let raw = Cursor::new(data).read_u32::<BigEndian>()?;
        Ok(CumulativePowerConsumption { value: f64::from(raw) / 1000.0 })
    }

    pub fn encode(&self) -> Vec<u8> {
        (((self.value * 1000.0).round()) as u32).to_be_bytes().to_vec()
    }
}

/// Manufacturer fault code (0x86).
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ManufacturerErrorCode {
    pub size: u8,
    pub manufacturer_code: u32,
    pub detail: Vec<u8>,
}

impl ManufacturerErrorCode {
    pub fn decode(data: &[u8]) -> Result<ManufacturerErrorCode, CodecError> {
        expect_at_least(data, 4)?;
        Ok(ManufacturerErrorCode {
            size: data[0],
            manufacturer_code: read_u24(&data[1..4]),
            detail: data[4..].to_vec(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.detail.len());
        out.push(self.size);
        push_u24(&mut out, self.manufacturer_code);
        out.extend_from_slice(&self.detail);
        out
    }
}

/// Current limit setting (0x87), percent.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct CurrentLimit {
    pub percent: u8,
}

impl CurrentLimit {
    pub fn decode(data: &[u8]) -> Result<CurrentLimit, CodecError> {
        expect_len(data, 1)?;
        Ok(CurrentLimit { percent: data[0] })
    }

    pub fn encode(&self) -> Vec<u8> {
        vec![self.percent]
    }
}

/// Fault occurrence status (0x88): 0x41 fault, 0x42 none.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct AbnormalState {
    pub abnormal: bool,
}

impl AbnormalState {
    pub fn decode(data: &[u8]) -> Result<AbnormalState, CodecError> {
        expect_len(data, 1)?;
        Ok(AbnormalState { abnormal: data[0] == 0x41 })
    }

    pub fn encode(&self) -> Vec<u8> {
        vec![if self.abnormal { 0x41 } else { 0x42 }]
    }
}

/// Manufacturer code (0x8A), 3 bytes big endian.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct ManufacturerCode {
    pub code: u32,
}

impl ManufacturerCode {
    pub fn decode(data: &[u8]) -> Result<ManufacturerCode, CodecError> {
        expect_len(data, 3)?;
        Ok(ManufacturerCode { code: read_u24(data) })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3);
        push_u24(&mut out, self.code);
        out
    }
}

/// Business facility code (0x8B), 3 bytes big endian.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct BusinessCode {
    pub code: u32,
}

impl BusinessCode {
    pub fn decode(data: &[u8]) -> Result<BusinessCode, CodecError> {
        expect_len(data, 3)?;
        Ok(BusinessCode { code: read_u24(data) })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3);
        push_u24(&mut out, self.code);
        out
    }
}

/// Product code (0x8C), 12 ASCII bytes, padding stripped on decode.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ProductCode {
    pub code: String,
}

impl ProductCode {
    pub fn decode(data: &[u8]) -> Result<ProductCode, CodecError> {
        expect_len(data, 12)?;
        Ok(ProductCode { code: ascii_field(data) })
    }

    pub fn encode(&self) -> Vec<u8> {
        padded_ascii(&self.code, 12)
    }
}

/// Production number (0x8D), 12 ASCII bytes.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct SerialNumber {
    pub value: String,
}

impl SerialNumber {
    pub fn decode(data: &[u8]) -> Result<SerialNumber, CodecError> {
        expect_len(data, 12)?;
        Ok(SerialNumber { value: ascii_field(data) })
    }

    pub fn encode(&self) -> Vec<u8> {
        padded_ascii(&self.value, 12)
    }
}

/// Production date (0x8E).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ManufactureDate {
    pub date: NaiveDate,
}

impl ManufactureDate {
    pub fn decode(data: &[u8]) -> Result<ManufactureDate, CodecError> {
        expect_len(data, 4)?;
        Ok(ManufactureDate { date: read_date(data)? })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4);
        push_date(&mut out, self.date);
        out
    }
}

/// Power saving operation setting (0x8F): 0x41 saving, 0x42 normal.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct PowerSavingMode {
    pub saving: bool,
}

impl PowerSavingMode {
    pub fn decode(data: &[u8]) -> Result<PowerSavingMode, CodecError> {
        expect_len(data, 1)?;
        match data[0] {
            0x41 => Ok(PowerSavingMode { saving: true }),
            0x42 => Ok(PowerSavingMode { saving: false }),
            _ => Err(CodecError::Value("unknown power saving state")),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        vec![if self.saving { 0x41 } else { 0x42 }]
    }
}

/// Remote control setting (0x93).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RemoteControl {
    NotThroughPublicLine = 0x41,
    ThroughPublicLine = 0x42,
    LineNormalDirectOnly = 0x61,
    LineNormalPublicAllowed = 0x62,
}

impl RemoteControl {
    pub fn decode(data: &[u8]) -> Result<RemoteControl, CodecError> {
        expect_len(data, 1)?;
        match data[0] {
            0x41 => Ok(RemoteControl::NotThroughPublicLine),
            0x42 => Ok(RemoteControl::ThroughPublicLine),
            0x61 => Ok(RemoteControl::LineNormalDirectOnly),
            0x62 => Ok(RemoteControl::LineNormalPublicAllowed),
            _ => Err(CodecError::Value("unknown remote control state")),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        vec![*self as u8]
    }
}

/// Current time setting (0x97): hour and minute.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct CurrentTime {
    pub time: NaiveTime,
}

impl CurrentTime {
    pub fn decode(data: &[u8]) -> Result<CurrentTime, CodecError> {
        expect_len(data, 2)?;
        let time = NaiveTime::from_hms_opt(u32::from(data[0]), u32::from(data[1]), 0)
            .ok_or(CodecError::Value("invalid time of day"))?;
        Ok(CurrentTime { time })
    }

    pub fn encode(&self) -> Vec<u8> {
        vec![self.time.hour() as u8, self.time.minute() as u8]
    }
}

/// Current date setting (0x98).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct CurrentDate {
    pub date: NaiveDate,
}

impl CurrentDate {
    pub fn decode(data: &[u8]) -> Result<CurrentDate, CodecError> {
        expect_len(data, 4)?;
        Ok(CurrentDate { date: read_date(data)? })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4);
        push_date(&mut out, self.date);
        out
    }
}

/// Power limit setting (0x99), watts.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct PowerLimit {
    pub watts: u16,
}

impl PowerLimit {
    pub fn decode(data: &[u8]) -> Result<PowerLimit, CodecError> {
        expect_len(data, 2)?;
        Ok(PowerLimit { watts: Cursor::new(data).read_u16::<BigEndian>()? })
    }

    pub fn encode(&self) -> Vec<u8> {
        self.watts.to_be_bytes().to_vec()
    }
}

/// Unit of the cumulative operating time counter.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TimeUnit {
    Seconds = 0x41,
    Minutes = 0x42,
    Hours = 0x43,
    Days = 0x44,
}

impl TimeUnit {
    pub fn from_u8(code: u8) -> Option<TimeUnit> {
        match code {
            0x41 => Some(TimeUnit::Seconds),
            0x42 => Some(TimeUnit::Minutes),
            0x43 => Some(TimeUnit::Hours),
            0x44 => Some(TimeUnit::Days),
            _ => None,
        }
    }
}

/// Cumulative operating time (0x9A): unit code plus a 4 byte counter.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct OperatingTime {
    pub unit: TimeUnit,
    pub value: u32,
}

impl OperatingTime {
    pub fn decode(data: &[u8]) -> Result<OperatingTime, CodecError> {
        expect_len(data, 5)?;
        let unit = TimeUnit::from_u8(data[0]).ok_or(CodecError::Value("unknown time unit"))?;
        Ok(OperatingTime { unit, value: Cursor::new(&data[1..5]).read_u32::<BigEndian>()? })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(5);
        out.push(self.unit as u8);
        out.extend_from_slice(&self.value.to_be_bytes());
        out
    }
}

/// Shared payload of the five property map properties (0x9B..0x9F).
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct PropertyMap {
    pub epcs: Vec<u8>,
}

impl PropertyMap {
    pub fn decode(data: &[u8]) -> Result<PropertyMap, CodecError> {
        Ok(PropertyMap { epcs: property_map::decode(data)? })
    }

    pub fn encode(&self) -> Vec<u8> {
        property_map::encode(&self.epcs)
    }
}

/// Decoder dispatch for the super class EPC range.
pub(crate) fn decode(epc: u8, edt: &[u8]) -> Result<Option<Property>, CodecError> {
    let property = match epc {
        0x80 => Property::OpStatus(OpStatus::decode(edt)?),
        0x81 => Property::InstallLocation(InstallLocation::decode(edt)?),
        0x82 => Property::VersionInfo(VersionInfo::decode(edt)?),
        0x84 => Property::InstantPowerConsumption(InstantPowerConsumption::decode(edt)?),
        0x85 => Property::CumulativePowerConsumption(CumulativePowerConsumption::decode(edt)?),
        0x86 => Property::ManufacturerErrorCode(ManufacturerErrorCode::decode(edt)?),
        0x87 => Property::CurrentLimit(CurrentLimit::decode(edt)?),
        0x88 => Property::AbnormalState(AbnormalState::decode(edt)?),
        0x8A => Property::ManufacturerCode(ManufacturerCode::decode(edt)?),
        0x8B => Property::BusinessCode(BusinessCode::decode(edt)?),
        0x8C => Property::ProductCode(ProductCode::decode(edt)?),
        0x8D => Property::SerialNumber(SerialNumber::decode(edt)?),
        0x8E => Property::ManufactureDate(ManufactureDate::decode(edt)?),
        0x8F => Property::PowerSavingMode(PowerSavingMode::decode(edt)?),
        0x93 => Property::RemoteControl(RemoteControl::decode(edt)?),
        0x97 => Property::CurrentTime(CurrentTime::decode(edt)?),
        0x98 => Property::CurrentDate(CurrentDate::decode(edt)?),
        0x99 => Property::PowerLimit(PowerLimit::decode(edt)?),
        0x9A => Property::OperatingTime(OperatingTime::decode(edt)?),
        0x9B => Property::SetMPropertyMap(PropertyMap::decode(edt)?),
        0x9C => Property::GetMPropertyMap(PropertyMap::decode(edt)?),
        0x9D => Property::AnnoPropertyMap(PropertyMap::decode(edt)?),
        0x9E => Property::SetPropertyMap(PropertyMap::decode(edt)?),
        0x9F => Property::GetPropertyMap(PropertyMap::decode(edt)?),
        _ => return Ok(None),
    };

    Ok(Some(property))
}

#[inline]
pub(crate) fn expect_len(data: &[u8], expected: usize) -> Result<(), CodecError> {
    if data.len() != expected {
        return Err(CodecError::Length { expected, got: data.len() });
    }
    Ok(())
}

#[inline]
pub(crate) fn expect_at_least(data: &[u8], expected: usize) -> Result<(), CodecError> {
    if data.len() < expected {
        return Err(CodecError::Length { expected, got: data.len() });
    }
    Ok(())
}

#[inline]
pub(crate) fn read_u24(data: &[u8]) -> u32 {
    (u32::from(data[0]) << 16) | (u32::from(data[1]) << 8) | u32::from(data[2])
}

#[inline]
pub(crate) fn push_u24(out: &mut Vec<u8>, value: u32) {
    out.push((value >> 16) as u8);
    out.push((value >> 8) as u8);
    out.push(value as u8);
}

/// 2 byte big endian year, month, day.
pub(crate) fn read_date(data: &[u8]) -> Result<NaiveDate, CodecError> {
    let year = Cursor::new(data).read_u16::<BigEndian>()?;
    NaiveDate::from_ymd_opt(i32::from(year), u32::from(data[2]), u32::from(data[3]))
        .ok_or(CodecError::Value("invalid calendar date"))
}

pub(crate) fn push_date(out: &mut Vec<u8>, date: NaiveDate) {
    out.extend_from_slice(&(date.year() as u16).to_be_bytes());
    out.push(date.month() as u8);
    out.push(date.day() as u8);
}

fn ascii_field(data: &[u8]) -> String {
    String::from_utf8_lossy(data).trim_matches(&['\0', ' '][..]).to_string()
}

fn padded_ascii(value: &str, width: usize) -> Vec<u8> {
    let mut out = value.as_bytes().to_vec();
    out.truncate(width);
    out.resize(width, 0x00);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_status() {
        assert_eq!(OpStatus::decode(&[0x30]).unwrap(), OpStatus { on: true });
        assert_eq!(OpStatus::decode(&[0x31]).unwrap(), OpStatus { on: false });
        assert_eq!(OpStatus { on: true }.encode(), vec![0x30]);
        assert_eq!(
            OpStatus::decode(&[0x30, 0x30]),
            Err(CodecError::Length { expected: 1, got: 2 })
        );
    }

    #[test]
    fn test_install_location_spot() {
        let location = InstallLocation::decode(&[0b1001_1010]).unwrap();

        assert_eq!(
            location,
            InstallLocation::Spot { code: LocationCode::Kitchen, number: 2, free_defined: true }
        );
        assert_eq!(location.encode().unwrap(), vec![0b1001_1010]);
    }

    #[test]
    fn test_install_location_special() {
        assert_eq!(InstallLocation::decode(&[0x00]).unwrap(), InstallLocation::NotSet);
        assert_eq!(InstallLocation::decode(&[0xFF]).unwrap(), InstallLocation::Undefined);
    }

    #[test]
    fn test_install_location_position() {
        let mut edt = vec![0x01];
        edt.extend_from_slice(&[0xAA; 16]);
        let location = InstallLocation::decode(&edt).unwrap();

        assert_eq!(location, InstallLocation::Position(vec![0xAA; 16]));
        assert_eq!(location.encode().unwrap(), edt);
        assert!(InstallLocation::decode(&[0x01, 0xAA]).is_err());
    }

    #[test]
    fn test_version_info() {
        let info = VersionInfo::decode(&[0x00, 0x00, b'J', 0x01]).unwrap();

        assert_eq!(info, VersionInfo { release: 'J', revision: 1 });
        assert_eq!(info.encode(), vec![0x00, 0x00, b'J', 0x01]);
    }

    #[test]
    fn test_manufacturer_code() {
        let code = ManufacturerCode::decode(&[0x00, 0x00, 0x16]).unwrap();

        assert_eq!(code.code, 0x16);
        assert_eq!(code.encode(), vec![0x00, 0x00, 0x16]);
    }

    #[test]
    fn test_product_code_strips_padding() {
        let mut edt = b"KM-N1".to_vec();
        edt.resize(12, 0x00);

        assert_eq!(ProductCode::decode(&edt).unwrap().code, "KM-N1");
        assert_eq!(ProductCode { code: "KM-N1".into() }.encode(), edt);
    }

    #[test]
    fn test_manufacture_date() {
        let date = ManufactureDate::decode(&[0x07, 0xE7, 0x03, 0x1F]).unwrap();

        assert_eq!(date.date, NaiveDate::from_ymd_opt(2023, 3, 31).unwrap());
        assert_eq!(date.encode(), vec![0x07, 0xE7, 0x03, 0x1F]);
        assert!(ManufactureDate::decode(&[0x07, 0xE7, 0x0D, 0x01]).is_err());
    }

    #[test]
    fn test_current_time() {
        let time = CurrentTime::decode(&[23, 59]).unwrap();

        assert_eq!(time.encode(), vec![23, 59]);
        assert!(CurrentTime::decode(&[24, 0]).is_err());
    }

    #[test]
    fn test_operating_time() {
        let time = OperatingTime::decode(&[0x43, 0x00, 0x00, 0x30, 0x39]).unwrap();

        assert_eq!(time, OperatingTime { unit: TimeUnit::Hours, value: 12345 });
        assert_eq!(time.encode(), vec![0x43, 0x00, 0x00, 0x30, 0x39]);
        assert!(OperatingTime::decode(&[0x45, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_property_map_payload() {
        let map = PropertyMap::decode(&[0x02, 0xE7, 0x80]).unwrap();

        assert_eq!(map.epcs, vec![0x80, 0xE7]);
        assert_eq!(map.encode(), vec![0x02, 0x80, 0xE7]);
    }

    #[test]
    fn test_remote_control() {
        assert_eq!(RemoteControl::decode(&[0x62]).unwrap(), RemoteControl::LineNormalPublicAllowed);
        assert!(RemoteControl::decode(&[0x00]).is_err());
    }

    #[test]
    fn test_dispatch_unknown_epc() {
        assert_eq!(decode(0x83, &[0x00]).unwrap(), None);
    }
}
