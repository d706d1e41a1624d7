// Field construction macros

/// Build a [`Fields`](crate::record::Fields) map from `key => value` pairs.
/// Values go through `FieldValue::from`.
///
/// ```
/// use compliance_logger::fields;
///
/// let fields = fields! { "user_id" => 12345, "email" => "john.doe@example.com" };
/// assert_eq!(fields.len(), 2);
/// ```
#[macro_export]
macro_rules! fields {
    () => {
        $crate::record::Fields::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut fields = $crate::record::Fields::new();
        $(
            fields.insert(
                ::std::string::String::from($key),
                $crate::record::FieldValue::from($value),
            );
        )+
        fields
    }};
}
