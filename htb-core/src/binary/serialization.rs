mod serializer;

pub use serializer::*;

use std::io::Write;

use crate::binary::Error;

pub trait Serialize {
    fn serialize(&self, serializer: &mut Serializer<impl Write>) -> Result<(), Error>;
}

macro_rules! serialize_primitive_le {
    ($T:ty) => {
        impl Serialize for $T {
            fn serialize(&self, serializer: &mut Serializer<impl Write>) -> Result<(), Error> {
                serializer.write_bytes(&self.to_le_bytes())
            }
        }
    };
}

serialize_primitive_le!(u8);
serialize_primitive_le!(u16);
serialize_primitive_le!(u32);

impl<const N: usize> Serialize for [u8; N] {
    fn serialize(&self, serializer: &mut Serializer<impl Write>) -> Result<(), Error> {
        serializer.write_bytes(self)
    }
}

impl<W> Serializer<W> {
    pub fn serialize<T>(&mut self, value: &T) -> Result<(), Error>
    where
        W: Write,
        T: Serialize + ?Sized,
    {
        value.serialize(self)
    }
}

pub fn serialize(value: &impl Serialize) -> Result<Vec<u8>, Error> {
    let mut serializer = Serializer::new(vec![]);
    value.serialize(&mut serializer)?;
    Ok(serializer.into_inner())
}
