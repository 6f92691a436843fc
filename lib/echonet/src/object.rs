use crate::code::DeviceClass;
use crate::error::CodecError;

/// ECHONET Lite object (EOJ): a device instance addressed by class group,
/// class and instance code. The class bytes are kept raw so that frames from
/// devices outside the known catalogue still decode.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct EnetObject {
    pub class_group: u8,
    pub class: u8,
    pub instance: u8,
}

impl EnetObject {
    #[inline]
    pub fn new(class: DeviceClass, instance: u8) -> EnetObject {
        EnetObject {
            class_group: class.class_group(),
            class: class.class_code(),
            instance,
        }
    }

    #[inline]
    pub fn from_raw(class_group: u8, class: u8, instance: u8) -> EnetObject {
        EnetObject { class_group, class, instance }
    }

    /// Catalogue entry for this object, if the (group, class) pair is known.
    #[inline]
    pub fn device_class(&self) -> Option<DeviceClass> {
        DeviceClass::from_codes(self.class_group, self.class)
    }

    #[inline]
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.class_group);
        out.push(self.class);
        out.push(self.instance);
    }

    pub fn decode(data: &[u8]) -> Result<EnetObject, CodecError> {
        if data.len() != 3 {
            return Err(CodecError::Length { expected: 3, got: data.len() });
        }

        Ok(EnetObject {
            class_group: data[0],
            class: data[1],
            instance: data[2],
        })
    }
}

/// Source/destination object pair carried in every frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ObjectHeader {
    pub src: EnetObject,
    pub dst: EnetObject,
}

impl ObjectHeader {
    #[inline]
    pub fn new(src: EnetObject, dst: EnetObject) -> ObjectHeader {
        ObjectHeader { src, dst }
    }

    #[inline]
    pub fn encode(&self, out: &mut Vec<u8>) {
        self.src.encode(out);
        self.dst.encode(out);
    }

    pub fn decode(data: &[u8]) -> Result<ObjectHeader, CodecError> {
        if data.len() != 6 {
            return Err(CodecError::Length { expected: 6, got: data.len() });
        }

        Ok(ObjectHeader {
            src: EnetObject::decode(&data[0..3])?,
            dst: EnetObject::decode(&data[3..6])?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_roundtrip() {
        let object = EnetObject::new(DeviceClass::LowVoltageSmartMeter, 0x01);
        let mut encoded = Vec::new();
        object.encode(&mut encoded);

        assert_eq!(encoded, vec![0x02, 0x88, 0x01]);
        assert_eq!(EnetObject::decode(&encoded).unwrap(), object);
    }

    #[test]
    fn test_unknown_class_decodes() {
        let object = EnetObject::decode(&[0x06, 0x01, 0x02]).unwrap();

        assert_eq!(object.class_group, 0x06);
        assert_eq!(object.device_class(), None);
    }

    #[test]
    fn test_header_roundtrip() {
        let header = ObjectHeader::new(
            EnetObject::new(DeviceClass::Controller, 0x01),
            EnetObject::new(DeviceClass::LowVoltageSmartMeter, 0x01),
        );
        let mut encoded = Vec::new();
        header.encode(&mut encoded);

        assert_eq!(encoded, vec![0x05, 0xFF, 0x01, 0x02, 0x88, 0x01]);
        assert_eq!(ObjectHeader::decode(&encoded).unwrap(), header);
    }

    #[test]
    fn test_bad_length() {
        assert_eq!(
            EnetObject::decode(&[0x02, 0x88]),
            Err(CodecError::Length { expected: 3, got: 2 })
        );
    }
}
