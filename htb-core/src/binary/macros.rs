/// Implements [`Deserialize`][crate::binary::Deserialize] and
/// [`Serialize`][crate::binary::Serialize] for a `bitflags` type, going through its underlying
/// integer. Unknown bits are retained so that they survive a round trip.
#[macro_export]
macro_rules! serializable_bitflags {
    ($T:ty) => {
        impl $crate::binary::Deserialize for $T {
            fn deserialize(
                deserializer: &mut $crate::binary::Deserializer<impl ::std::io::Read>,
            ) -> ::std::result::Result<Self, $crate::binary::Error> {
                Ok(Self::from_bits_retain(deserializer.deserialize()?))
            }
        }

        impl $crate::binary::Serialize for $T {
            fn serialize(
                &self,
                serializer: &mut $crate::binary::Serializer<impl ::std::io::Write>,
            ) -> ::std::result::Result<(), $crate::binary::Error> {
                serializer.serialize(&self.bits())
            }
        }
    };
}
