/// Generates the public API of a settings struct's scalar fields.
///
/// For each `(field, setter, min, max, doc)` entry this emits a getter and a
/// setter that clamps into `[min, max]` (NaN maps to `min`), plus one
/// `clamped()` method applying every range at once. Settings arriving from an
/// external loader go through `clamped()` before an effect sees them.
macro_rules! impl_settings_api {
    (
        $struct_name:ident,
        scalars: [ $(($field:ident, $setter:ident, $min:expr, $max:expr, $doc:expr)),* $(,)? ]
    ) => {
        impl $struct_name {
            $(
                #[doc = $doc]
                #[inline]
                #[must_use]
                pub fn $field(&self) -> f32 {
                    self.$field
                }

                #[doc = concat!(
                    "Sets `", stringify!($field), "`, clamped to `[",
                    stringify!($min), ", ", stringify!($max), "]`."
                )]
                pub fn $setter(&mut self, value: f32) {
                    self.$field = $crate::resources::clamp_param(value, $min, $max);
                }
            )*

            /// Clamps every scalar into its valid range.
            #[must_use]
            pub fn clamped(mut self) -> Self {
                $( self.$field = $crate::resources::clamp_param(self.$field, $min, $max); )*
                self
            }
        }
    };
}

pub(crate) use impl_settings_api;
