//! Typed device properties and their EDT codecs.
//!
//! Each property is one enum variant wrapping its payload struct. Decoding is
//! dispatched by the source object's (class group, class) pair and the EPC:
//! the device super class range 0x80..0x9F resolves first regardless of
//! class, then the class-specific catalogues. EPCs nobody decodes are
//! reported as `None` so the caller can skip the tuple and keep going.

pub mod device;
pub mod profile;
pub mod property_map;
pub mod smart_meter;

use crate::access::Access;
use crate::error::CodecError;
use crate::object::EnetObject;

pub use device::{
    AbnormalState, BusinessCode, CumulativePowerConsumption, CurrentDate, CurrentLimit,
    CurrentTime, InstallLocation, InstantPowerConsumption, LocationCode, ManufactureDate,
    ManufacturerCode, ManufacturerErrorCode, OpStatus, OperatingTime, PowerLimit,
    PowerSavingMode, ProductCode, PropertyMap, RemoteControl, SerialNumber, TimeUnit,
    VersionInfo,
};
pub use profile::InstanceList;
pub use smart_meter::{
    Coefficient, CumulativeEnergy, CumulativeHistory1, CumulativeHistoryLog, EnergyRecord,
    EnergyUnit, HistoryCollectDay1, HistoryCollectSpan, MomentCurrent, MomentPower,
    OneMinuteCumulative, RouteBId, ScheduledCumulative, SignificantDigits,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    // Device object super class (0x80..0x9F).
    OpStatus(OpStatus),
    InstallLocation(InstallLocation),
    VersionInfo(VersionInfo),
    InstantPowerConsumption(InstantPowerConsumption),
    CumulativePowerConsumption(CumulativePowerConsumption),
    ManufacturerErrorCode(ManufacturerErrorCode),
    CurrentLimit(CurrentLimit),
    AbnormalState(AbnormalState),
    ManufacturerCode(ManufacturerCode),
    BusinessCode(BusinessCode),
    ProductCode(ProductCode),
    SerialNumber(SerialNumber),
    ManufactureDate(ManufactureDate),
    PowerSavingMode(PowerSavingMode),
    RemoteControl(RemoteControl),
    CurrentTime(CurrentTime),
    CurrentDate(CurrentDate),
    PowerLimit(PowerLimit),
    OperatingTime(OperatingTime),
    SetMPropertyMap(PropertyMap),
    GetMPropertyMap(PropertyMap),
    AnnoPropertyMap(PropertyMap),
    SetPropertyMap(PropertyMap),
    GetPropertyMap(PropertyMap),
    // Low voltage smart meter (0x02, 0x88).
    RouteBId(RouteBId),
    OneMinuteCumulative(OneMinuteCumulative),
    Coefficient(Coefficient),
    SignificantDigits(SignificantDigits),
    CumulativeEnergyNormal(CumulativeEnergy),
    CumulativeEnergyUnit(EnergyUnit),
    CumulativeHistory1Normal(CumulativeHistory1),
    CumulativeEnergyReverse(CumulativeEnergy),
    CumulativeHistory1Reverse(CumulativeHistory1),
    HistoryCollectDay1(HistoryCollectDay1),
    MomentPower(MomentPower),
    MomentCurrent(MomentCurrent),
    ScheduledCumulativeNormal(ScheduledCumulative),
    ScheduledCumulativeReverse(ScheduledCumulative),
    CumulativeHistory2(CumulativeHistoryLog),
    HistoryCollectDay2(HistoryCollectSpan),
    CumulativeHistory3(CumulativeHistoryLog),
    HistoryCollectDay3(HistoryCollectSpan),
    // Node profile (0x0E, 0xF0).
    InstanceList(InstanceList),
}

impl Property {
    /// The property code this value travels under.
    pub fn epc(&self) -> u8 {
        match self {
            Property::OpStatus(_) => 0x80,
            Property::InstallLocation(_) => 0x81,
            Property::VersionInfo(_) => 0x82,
            Property::InstantPowerConsumption(_) => 0x84,
            Property::CumulativePowerConsumption(_) => 0x85,
            Property::ManufacturerErrorCode(_) => 0x86,
            Property::CurrentLimit(_) => 0x87,
            Property::AbnormalState(_) => 0x88,
            Property::ManufacturerCode(_) => 0x8A,
            Property::BusinessCode(_) => 0x8B,
            Property::ProductCode(_) => 0x8C,
            Property::SerialNumber(_) => 0x8D,
            Property::ManufactureDate(_) => 0x8E,
            Property::PowerSavingMode(_) => 0x8F,
            Property::RemoteControl(_) => 0x93,
            Property::CurrentTime(_) => 0x97,
            Property::CurrentDate(_) => 0x98,
            Property::PowerLimit(_) => 0x99,
            Property::OperatingTime(_) => 0x9A,
            Property::SetMPropertyMap(_) => 0x9B,
            Property::GetMPropertyMap(_) => 0x9C,
            Property::AnnoPropertyMap(_) => 0x9D,
            Property::SetPropertyMap(_) => 0x9E,
            Property::GetPropertyMap(_) => 0x9F,
            Property::RouteBId(_) => 0xC0,
            Property::OneMinuteCumulative(_) => 0xD0,
            Property::Coefficient(_) => 0xD3,
            Property::SignificantDigits(_) => 0xD7,
            Property::CumulativeEnergyNormal(_) => 0xE0,
            Property::CumulativeEnergyUnit(_) => 0xE1,
            Property::CumulativeHistory1Normal(_) => 0xE2,
            Property::CumulativeEnergyReverse(_) => 0xE3,
            Property::CumulativeHistory1Reverse(_) => 0xE4,
            Property::HistoryCollectDay1(_) => 0xE5,
            Property::MomentPower(_) => 0xE7,
            Property::MomentCurrent(_) => 0xE8,
            Property::ScheduledCumulativeNormal(_) => 0xEA,
            Property::ScheduledCumulativeReverse(_) => 0xEB,
            Property::CumulativeHistory2(_) => 0xEC,
            Property::HistoryCollectDay2(_) => 0xED,
            Property::CumulativeHistory3(_) => 0xEE,
            Property::HistoryCollectDay3(_) => 0xEF,
            Property::InstanceList(_) => 0xD5,
        }
    }

    /// Access rules the property supports on the device.
    pub fn access_rules(&self) -> Access {
        match self {
            Property::OpStatus(_)
            | Property::InstallLocation(_)
            | Property::PowerSavingMode(_)
            | Property::RemoteControl(_)
            | Property::CurrentTime(_)
            | Property::CurrentDate(_)
            | Property::PowerLimit(_)
            | Property::HistoryCollectDay1(_)
            | Property::HistoryCollectDay2(_)
            | Property::HistoryCollectDay3(_) => Access::GET | Access::SET,
            Property::InstanceList(_) => Access::ANNO,
            _ => Access::GET,
        }
    }

    /// Encode the EDT payload for the given mode. GET mode always produces an
    /// empty payload (PDC 0); SET and announcement modes produce the full
    /// field layout.
    pub fn encode(&self, mode: Access) -> Result<Vec<u8>, CodecError> {
        if mode == Access::GET {
            return Ok(Vec::new());
        }

        match self {
            Property::OpStatus(p) => Ok(p.encode()),
            Property::InstallLocation(p) => p.encode(),
            Property::VersionInfo(p) => Ok(p.encode()),
            Property::InstantPowerConsumption(p) => Ok(p.encode()),
            Property::CumulativePowerConsumption(p) => Ok(p.encode()),
            Property::ManufacturerErrorCode(p) => Ok(p.encode()),
            Property::CurrentLimit(p) => Ok(p.encode()),
            Property::AbnormalState(p) => Ok(p.encode()),
            Property::ManufacturerCode(p) => Ok(p.encode()),
            Property::BusinessCode(p) => Ok(p.encode()),
            Property::ProductCode(p) => Ok(p.encode()),
            Property::SerialNumber(p) => Ok(p.encode()),
            Property::ManufactureDate(p) => Ok(p.encode()),
            Property::PowerSavingMode(p) => Ok(p.encode()),
            Property::RemoteControl(p) => Ok(p.encode()),
            Property::CurrentTime(p) => Ok(p.encode()),
            Property::CurrentDate(p) => Ok(p.encode()),
            Property::PowerLimit(p) => Ok(p.encode()),
            Property::OperatingTime(p) => Ok(p.encode()),
            Property::SetMPropertyMap(p)
            | Property::GetMPropertyMap(p)
            | Property::AnnoPropertyMap(p)
            | Property::SetPropertyMap(p)
            | Property::GetPropertyMap(p) => Ok(p.encode()),
            Property::RouteBId(p) => Ok(p.encode()),
            Property::OneMinuteCumulative(p) => Ok(p.encode()),
            Property::Coefficient(p) => Ok(p.encode()),
            Property::SignificantDigits(p) => Ok(p.encode()),
            Property::CumulativeEnergyNormal(p) | Property::CumulativeEnergyReverse(p) => {
                Ok(p.encode())
            }
            Property::CumulativeEnergyUnit(p) => Ok(p.encode()),
            Property::CumulativeHistory1Normal(p) | Property::CumulativeHistory1Reverse(p) => {
                Ok(p.encode())
            }
            Property::HistoryCollectDay1(p) => p.encode(),
            Property::MomentPower(p) => Ok(p.encode()),
            Property::MomentCurrent(p) => Ok(p.encode()),
            Property::ScheduledCumulativeNormal(p) | Property::ScheduledCumulativeReverse(p) => {
                Ok(p.encode())
            }
            Property::CumulativeHistory2(p) | Property::CumulativeHistory3(p) => Ok(p.encode()),
            Property::HistoryCollectDay2(p) => p.encode(true, 12),
            Property::HistoryCollectDay3(p) => p.encode(false, 10),
            Property::InstanceList(p) => Ok(p.encode()),
        }
    }

    /// Decode one (EPC, EDT) tuple received from `src`. `Ok(None)` means no
    /// decoder exists for the tuple and it should be skipped.
    pub fn decode(src: EnetObject, epc: u8, edt: &[u8]) -> Result<Option<Property>, CodecError> {
        if epc < 0x80 {
            return Err(CodecError::Value("EPC below 0x80"));
        }

        // Super class properties apply to every device class.
        if epc < 0xA0 {
            return device::decode(epc, edt);
        }

        match crate::code::DeviceClass::from_codes(src.class_group, src.class) {
            Some(crate::code::DeviceClass::LowVoltageSmartMeter) => smart_meter::decode(epc, edt),
            Some(crate::code::DeviceClass::NodeProfile) => profile::decode(epc, edt),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::DeviceClass;

    fn meter() -> EnetObject {
        EnetObject::new(DeviceClass::LowVoltageSmartMeter, 0x01)
    }

    #[test]
    fn test_get_mode_is_empty() {
        let property = Property::MomentPower(MomentPower { value: Some(1234) });

        assert_eq!(property.encode(Access::GET).unwrap(), Vec::<u8>::new());
        assert_eq!(property.encode(Access::SET).unwrap(), vec![0x00, 0x00, 0x04, 0xD2]);
    }

    #[test]
    fn test_dispatch_super_class_first() {
        // 0x80 decodes the same way for a smart meter and an unknown class.
        let decoded = Property::decode(meter(), 0x80, &[0x30]).unwrap();
        assert_eq!(decoded, Some(Property::OpStatus(OpStatus { on: true })));

        let unknown_src = EnetObject::from_raw(0x06, 0x01, 0x01);
        let decoded = Property::decode(unknown_src, 0x80, &[0x30]).unwrap();
        assert_eq!(decoded, Some(Property::OpStatus(OpStatus { on: true })));
    }

    #[test]
    fn test_dispatch_keyed_by_class_pair() {
        let edt = [0x7F, 0xFF, 0xFF, 0xFE];

        let decoded = Property::decode(meter(), 0xE7, &edt).unwrap();
        assert_eq!(decoded, Some(Property::MomentPower(MomentPower { value: None })));

        // The same EPC from a class with the same class byte in another
        // group has no decoder.
        let impostor = EnetObject::from_raw(0x04, 0x88, 0x01);
        assert_eq!(Property::decode(impostor, 0xE7, &edt).unwrap(), None);
    }

    #[test]
    fn test_dispatch_rejects_low_epc() {
        assert!(Property::decode(meter(), 0x7F, &[0x00]).is_err());
    }

    #[test]
    fn test_node_profile_dispatch() {
        let profile = EnetObject::new(DeviceClass::NodeProfile, 0x01);
        let decoded = Property::decode(profile, 0xD5, &[0x01, 0x02, 0x88, 0x01]).unwrap();

        assert_eq!(
            decoded,
            Some(Property::InstanceList(InstanceList {
                objects: vec![EnetObject::from_raw(0x02, 0x88, 0x01)],
            }))
        );
    }

    #[test]
    fn test_set_capable_roundtrips() {
        let properties = vec![
            Property::OpStatus(OpStatus { on: false }),
            Property::PowerLimit(PowerLimit { watts: 1500 }),
            Property::HistoryCollectDay1(HistoryCollectDay1 { day: Some(2) }),
            Property::PowerSavingMode(PowerSavingMode { saving: true }),
        ];
        let src = meter();

        for property in properties {
            let edt = property.encode(Access::SET).unwrap();
            let decoded = Property::decode(src, property.epc(), &edt).unwrap();
            assert_eq!(decoded, Some(property));
        }
    }
}
