//! Kind-checked wrappers around [`ResourceRef`].

use crate::errors::{Result, WardenError};
use crate::handle::{Generation, ResourceKind};
use crate::resource::ResourceRef;

macro_rules! typed_ids {
    ($($(#[$meta:meta])* $name:ident => $kind:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
            pub struct $name(ResourceRef);

            impl $name {
                pub const KIND: ResourceKind = ResourceKind::$kind;

                #[inline]
                #[must_use]
                pub fn raw(self) -> ResourceRef {
                    self.0
                }

                #[inline]
                #[must_use]
                pub fn generation(self) -> Generation {
                    self.0.generation()
                }

                #[inline]
                pub(crate) fn from_raw(raw: ResourceRef) -> Self {
                    debug_assert_eq!(raw.kind(), Self::KIND);
                    Self(raw)
                }
            }

            impl From<$name> for ResourceRef {
                #[inline]
                fn from(id: $name) -> Self {
                    id.0
                }
            }

            impl TryFrom<ResourceRef> for $name {
                type Error = WardenError;

                fn try_from(raw: ResourceRef) -> Result<Self> {
                    if raw.kind() == Self::KIND {
                        Ok(Self(raw))
                    } else {
                        Err(WardenError::KindMismatch {
                            expected: Self::KIND,
                            found: raw.kind(),
                        })
                    }
                }
            }
        )*
    };
}

typed_ids! {
    DeviceId => Device;
    /// The single queue of a device.
    QueueId => Queue;
    BufferId => Buffer;
    TextureId => Texture;
    TextureViewId => TextureView;
    CommandEncoderId => CommandEncoder;
}
