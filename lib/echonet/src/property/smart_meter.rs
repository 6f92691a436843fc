//! Low voltage smart electric energy meter properties (class 0x02, 0x88).
//!
//! The meter reports "no value" through sentinels: 0xFFFFFFFE for cumulative
//! energy registers, 0x7FFFFFFE for instantaneous power, 0x7FFE per phase for
//! instantaneous current, and an all-0xFF timestamp header for history pages
//! that have not been collected yet.

use crate::error::CodecError;
use crate::property::device::{expect_len, push_u24, read_u24};
use crate::property::Property;
use byteorder::{BigEndian, ReadBytesExt};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use std::io::Cursor;

const NO_ENERGY: u32 = 0xFFFF_FFFE;
const NO_POWER: i32 = 0x7FFF_FFFE;
const NO_CURRENT: u16 = 0x7FFE;
const NO_COLLECT_DAY: u8 = 0xFF;

/// Route-B identification number (0xC0).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RouteBId {
    pub manufacturer_code: u32,
    pub free_area: [u8; 12],
}

impl RouteBId {
    pub fn decode(data: &[u8]) -> Result<RouteBId, CodecError> {
        expect_len(data, 16)?;
        let mut free_area = [0u8; 12];
        free_area.copy_from_slice(&data[4..16]);
        Ok(RouteBId { manufacturer_code: read_u24(&data[1..4]), free_area })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16);
        out.push(0x00);
        push_u24(&mut out, self.manufacturer_code);
        out.extend_from_slice(&self.free_area);
        out
    }
}

/// One minute cumulative energy in both directions (0xD0).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct OneMinuteCumulative {
    pub at: NaiveDateTime,
    pub forward: Option<u32>,
    pub reverse: Option<u32>,
}

impl OneMinuteCumulative {
    pub fn decode(data: &[u8]) -> Result<OneMinuteCumulative, CodecError> {
        expect_len(data, 15)?;
        let at = read_datetime(&data[0..7])?;
        let mut rest = Cursor::new(&data[7..15]);
        Ok(OneMinuteCumulative {
            at,
            forward: energy_value(rest.read_u32::<BigEndian>()?),
            reverse: energy_value(rest.read_u32::<BigEndian>()?),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(15);
        push_datetime(&mut out, self.at);
        out.extend_from_slice(&energy_raw(self.forward).to_be_bytes());
        out.extend_from_slice(&energy_raw(self.reverse).to_be_bytes());
        out
    }
}

/// Coefficient applied to the cumulative registers (0xD3).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Coefficient {
    pub value: u32,
}

impl Coefficient {
    pub fn decode(data: &[u8]) -> Result<Coefficient, CodecError> {
        expect_len(data, 4)?;
        Ok(Coefficient { value: Cursor::new(data).read_u32::<BigEndian>()? })
    }

    pub fn encode(&self) -> Vec<u8> {
        self.value.to_be_bytes().to_vec()
    }
}

impl Default for Coefficient {
    fn default() -> Coefficient {
        Coefficient { value: 1 }
    }
}

/// Number of effective digits of the cumulative registers (0xD7).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SignificantDigits {
    pub digits: u8,
}

impl SignificantDigits {
    pub fn decode(data: &[u8]) -> Result<SignificantDigits, CodecError> {
        expect_len(data, 1)?;
        Ok(SignificantDigits { digits: data[0] })
    }

    pub fn encode(&self) -> Vec<u8> {
        vec![self.digits]
    }
}

/// Cumulative energy register (0xE0 normal direction, 0xE3 reverse).
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct CumulativeEnergy {
    pub value: Option<u32>,
}

impl CumulativeEnergy {
    pub fn decode(data: &[u8]) -> Result<CumulativeEnergy, CodecError> {
        expect_len(data, 4)?;
        Ok(CumulativeEnergy { value: energy_value(Cursor::new(data).read_u32::<BigEndian>()?) })
    }

    pub fn encode(&self) -> Vec<u8> {
        energy_raw(self.value).to_be_bytes().to_vec()
    }
}

/// Unit of the cumulative energy registers (0xE1).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum EnergyUnit {
    Kwh = 0x00,
    DeciKwh = 0x01,
    CentiKwh = 0x02,
    MilliKwh = 0x03,
    TenthMilliKwh = 0x04,
    DecaKwh = 0x0A,
    HectoKwh = 0x0B,
    KiloKwh = 0x0C,
    TenKiloKwh = 0x0D,
}

impl EnergyUnit {
    pub fn decode(data: &[u8]) -> Result<EnergyUnit, CodecError> {
        expect_len(data, 1)?;
        match data[0] {
            0x00 => Ok(EnergyUnit::Kwh),
            0x01 => Ok(EnergyUnit::DeciKwh),
            0x02 => Ok(EnergyUnit::CentiKwh),
            0x03 => Ok(EnergyUnit::MilliKwh),
            0x04 => Ok(EnergyUnit::TenthMilliKwh),
            0x0A => Ok(EnergyUnit::DecaKwh),
            0x0B => Ok(EnergyUnit::HectoKwh),
            0x0C => Ok(EnergyUnit::KiloKwh),
            0x0D => Ok(EnergyUnit::TenKiloKwh),
            _ => Err(CodecError::Value("unknown energy unit")),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        vec![*self as u8]
    }

    /// kWh represented by one count of the cumulative registers.
    pub fn multiplier(self) -> f64 {
        match self {
            EnergyUnit::Kwh => 1.0,
            EnergyUnit::DeciKwh => 0.1,
            EnergyUnit::CentiKwh => 0.01,
            EnergyUnit::MilliKwh => 0.001,
            EnergyUnit::TenthMilliKwh => 0.0001,
            EnergyUnit::DecaKwh => 10.0,
            EnergyUnit::HectoKwh => 100.0,
            EnergyUnit::KiloKwh => 1000.0,
            EnergyUnit::TenKiloKwh => 10000.0,
        }
    }
}

/// Daily half-hour history page (0xE2 normal direction, 0xE4 reverse):
/// collect day plus 48 samples.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct CumulativeHistory1 {
    pub collect_day: u16,
    pub values: Vec<Option<u32>>,
}

impl CumulativeHistory1 {
    const SAMPLES: usize = 48;

    pub fn decode(data: &[u8]) -> Result<CumulativeHistory1, CodecError> {
        expect_len(data, 2 + Self::SAMPLES * 4)?;
        let mut cursor = Cursor::new(data);
        let collect_day = cursor.read_u16::<BigEndian>()?;
        let mut values = Vec::with_capacity(Self::SAMPLES);
        for _ in 0..Self::SAMPLES {
            values.push(energy_value(cursor.read_u32::<BigEndian>()?));
        }
        Ok(CumulativeHistory1 { collect_day, values })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.values.len() * 4);
        out.extend_from_slice(&self.collect_day.to_be_bytes());
        for value in &self.values {
            out.extend_from_slice(&energy_raw(*value).to_be_bytes());
        }
        out
    }
}

/// Day selector for history page 1 (0xE5): 0..99 days back, 0xFF unset.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct HistoryCollectDay1 {
    pub day: Option<u8>,
}

impl HistoryCollectDay1 {
    pub fn decode(data: &[u8]) -> Result<HistoryCollectDay1, CodecError> {
        expect_len(data, 1)?;
        Ok(HistoryCollectDay1 {
            day: if data[0] == NO_COLLECT_DAY { None } else { Some(data[0]) },
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        match self.day {
            Some(day) if day <= 99 => Ok(vec![day]),
            Some(_) => Err(CodecError::Value("collect day above 99")),
            None => Err(CodecError::Value("collect day not set")),
        }
    }
}

/// Instantaneous power (0xE7), signed watts.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct MomentPower {
    pub value: Option<i32>,
}

impl MomentPower {
    pub fn decode(data: &[u8]) -> Result<MomentPower, CodecError> {
        expect_len(data, 4)?;
        let raw = Cursor::new(data).read_i32::<BigEndian>()?;
        Ok(MomentPower { value: if raw == NO_POWER { None } else { Some(raw) } })
    }

    pub fn encode(&self) -> Vec<u8> {
        self.value.unwrap_or(NO_POWER).to_be_bytes().to_vec()
    }
}

/// Instantaneous current (0xE8): R and T phase in amperes, 0.1 A resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MomentCurrent {
    pub r_phase: Option<f32>,
    pub t_phase: Option<f32>,
}

impl MomentCurrent {
    pub fn decode(data: &[u8]) -> Result<MomentCurrent, CodecError> {
        expect_len(data, 4)?;
        let mut cursor = Cursor::new(data);
        Ok(MomentCurrent {
            r_phase: phase_value(cursor.read_u16::<BigEndian>()?),
            t_phase: phase_value(cursor.read_u16::<BigEndian>()?),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4);
        out.extend_from_slice(&phase_raw(self.r_phase).to_be_bytes());
        out.extend_from_slice(&phase_raw(self.t_phase).to_be_bytes());
        out
    }
}

/// Cumulative energy at the most recent 30 minute boundary (0xEA normal
/// direction, 0xEB reverse).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ScheduledCumulative {
    pub at: NaiveDateTime,
    pub value: Option<u32>,
}

impl ScheduledCumulative {
    pub fn decode(data: &[u8]) -> Result<ScheduledCumulative, CodecError> {
        expect_len(data, 11)?;
        let at = read_datetime(&data[0..7])?;
        let raw = Cursor::new(&data[7..11]).read_u32::<BigEndian>()?;
        Ok(ScheduledCumulative { at, value: energy_value(raw) })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(11);
        push_datetime(&mut out, self.at);
        out.extend_from_slice(&energy_raw(self.value).to_be_bytes());
        out
    }
}

/// One forward/reverse sample of a history-2/3 page.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct EnergyRecord {
    pub forward: Option<u32>,
    pub reverse: Option<u32>,
}

/// History pages 2 (0xEC) and 3 (0xEE): collection timestamp plus paired
/// forward/reverse samples. An all-0xFF header means the page has not been
/// collected and carries exactly one null record.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct CumulativeHistoryLog {
    pub at: Option<NaiveDateTime>,
    pub records: Vec<EnergyRecord>,
}

impl CumulativeHistoryLog {
    pub fn decode(data: &[u8]) -> Result<CumulativeHistoryLog, CodecError> {
        if data.len() < 7 || (data.len() - 7) % 8 != 0 {
            return Err(CodecError::Length { expected: 7, got: data.len() });
        }

        if is_blank_header(&data[0..6]) {
            return Ok(CumulativeHistoryLog {
                at: None,
                records: vec![EnergyRecord::default()],
            });
        }

        let at = read_short_datetime(&data[0..6])?;
        let count = data[6] as usize;
        if data.len() != 7 + count * 8 {
            return Err(CodecError::Length { expected: 7 + count * 8, got: data.len() });
        }

        let mut cursor = Cursor::new(&data[7..]);
        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            records.push(EnergyRecord {
                forward: energy_value(cursor.read_u32::<BigEndian>()?),
                reverse: energy_value(cursor.read_u32::<BigEndian>()?),
            });
        }

        Ok(CumulativeHistoryLog { at: Some(at), records })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(7 + self.records.len() * 8);
        match self.at {
            Some(at) => push_short_datetime(&mut out, at),
            None => out.extend_from_slice(&[0xFF; 6]),
        }
        out.push(self.records.len() as u8);
        for record in &self.records {
            out.extend_from_slice(&energy_raw(record.forward).to_be_bytes());
            out.extend_from_slice(&energy_raw(record.reverse).to_be_bytes());
        }
        out
    }
}

/// Collection selectors for history pages 2 (0xED) and 3 (0xEF): start
/// timestamp plus the number of records to collect.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct HistoryCollectSpan {
    pub at: Option<NaiveDateTime>,
    pub count: u8,
}

impl HistoryCollectSpan {
    pub fn decode(data: &[u8]) -> Result<HistoryCollectSpan, CodecError> {
        expect_len(data, 7)?;
        if is_blank_header(&data[0..6]) {
            return Ok(HistoryCollectSpan { at: None, count: 1 });
        }
        Ok(HistoryCollectSpan { at: Some(read_short_datetime(&data[0..6])?), count: data[6] })
    }

    /// SET payload; `half_hour_aligned` additionally restricts the start
    /// minute to 00 or 30 (history page 2), and `max_count` bounds the
    /// record count (12 for page 2, 10 for page 3).
    pub fn encode(&self, half_hour_aligned: bool, max_count: u8) -> Result<Vec<u8>, CodecError> {
        let at = self.at.ok_or(CodecError::Value("collection start not set"))?;
        if half_hour_aligned && at.minute() != 0 && at.minute() != 30 {
            return Err(CodecError::Value("minute must be 00 or 30"));
        }
        if self.count < 1 || self.count > max_count {
            return Err(CodecError::Value("record count out of range"));
        }

        let mut out = Vec::with_capacity(7);
        push_short_datetime(&mut out, at);
        out.push(self.count);
        Ok(out)
    }
}

/// Decoder dispatch for the smart meter class.
pub(crate) fn decode(epc: u8, edt: &[u8]) -> Result<Option<Property>, CodecError> {
    let property = match epc {
        0xC0 => Property::RouteBId(RouteBId::decode(edt)?),
        0xD0 => Property::OneMinuteCumulative(OneMinuteCumulative::decode(edt)?),
        0xD3 => Property::Coefficient(Coefficient::decode(edt)?),
        0xD7 => Property::SignificantDigits(SignificantDigits::decode(edt)?),
        0xE0 => Property::CumulativeEnergyNormal(CumulativeEnergy::decode(edt)?),
        0xE1 => Property::CumulativeEnergyUnit(EnergyUnit::decode(edt)?),
        0xE2 => Property::CumulativeHistory1Normal(CumulativeHistory1::decode(edt)?),
        0xE3 => Property::CumulativeEnergyReverse(CumulativeEnergy::decode(edt)?),
        0xE4 => Property::CumulativeHistory1Reverse(CumulativeHistory1::decode(edt)?),
        0xE5 => Property::HistoryCollectDay1(HistoryCollectDay1::decode(edt)?),
        0xE7 => Property::MomentPower(MomentPower::decode(edt)?),
        0xE8 => Property::MomentCurrent(MomentCurrent::decode(edt)?),
        0xEA => Property::ScheduledCumulativeNormal(ScheduledCumulative::decode(edt)?),
        0xEB => Property::ScheduledCumulativeReverse(ScheduledCumulative::decode(edt)?),
        0xEC => Property::CumulativeHistory2(CumulativeHistoryLog::decode(edt)?),
        0xED => Property::HistoryCollectDay2(HistoryCollectSpan::decode(edt)?),
        0xEE => Property::CumulativeHistory3(CumulativeHistoryLog::decode(edt)?),
        0xEF => Property::HistoryCollectDay3(HistoryCollectSpan::decode(edt)?),
        _ => return Ok(None),
    };

    Ok(Some(property))
}

#[inline]
fn energy_value(raw: u32) -> Option<u32> {
    if raw == NO_ENERGY {
        None
    } else {
        Some(raw)
    }
}

#[inline]
fn energy_raw(value: Option<u32>) -> u32 {
    value.unwrap_or(NO_ENERGY)
}

#[inline]
fn phase_value(raw: u16) -> Option<f32> {
    if raw == NO_CURRENT {
        None
    } else {
        Some(f32::from(raw) / 10.0)
    }
}

#[inline]
fn phase_raw(value: Option<f32>) -> u16 {
    match value {
        Some(amps) => (amps * 10.0).round() as u16,
        None => NO_CURRENT,
    }
}

#[inline]
fn is_blank_header(header: &[u8]) -> bool {
    header.iter().all(|&byte| byte == 0xFF)
}

/// 2 byte big endian year, month, day, hour, minute, second.
fn read_datetime(data: &[u8]) -> Result<NaiveDateTime, CodecError> {
    let year = Cursor::new(data).read_u16::<BigEndian>()?;
    NaiveDate::from_ymd_opt(i32::from(year), u32::from(data[2]), u32::from(data[3]))
        .and_then(|date| {
            date.and_hms_opt(u32::from(data[4]), u32::from(data[5]), u32::from(data[6]))
        })
        .ok_or(CodecError::Value("invalid timestamp"))
}

fn push_datetime(out: &mut Vec<u8>, at: NaiveDateTime) {
    push_short_datetime(out, at);
    out.push(at.second() as u8);
}

/// As `read_datetime` but without the trailing second.
fn read_short_datetime(data: &[u8]) -> Result<NaiveDateTime, CodecError> {
    let year = Cursor::new(data).read_u16::<BigEndian>()?;
    NaiveDate::from_ymd_opt(i32::from(year), u32::from(data[2]), u32::from(data[3]))
        .and_then(|date| date.and_hms_opt(u32::from(data[4]), u32::from(data[5]), 0))
        .ok_or(CodecError::Value("invalid timestamp"))
}

fn push_short_datetime(out: &mut Vec<u8>, at: NaiveDateTime) {
    out.extend_from_slice(&(at.year() as u16).to_be_bytes());
    out.push(at.month() as u8);
    out.push(at.day() as u8);
    out.push(at.hour() as u8);
    out.push(at.minute() as u8);
}
