//! Unmangling of MSVC-decorated symbol names as found in linker MAP
//! files.

use std::borrow::Cow;


/// Perform very simple unmangling of MSVC-decorated C++ names.
///
/// Arguments and template arguments are not handled; the result is the
/// namespace-qualified path of the symbol. The decorated names have the
/// form:
///
/// ```text
/// ?LookupInDescriptor@JSObject@internal@v8@@...arguments info...
/// ```
///
/// Undecorated (`extern "C"` style) names and names that cannot be
/// unmangled pass through unchanged.
pub fn unmangle_msvc(name: &str) -> Cow<'_, str> {
    if !name.starts_with('?') {
        return Cow::Borrowed(name)
    }

    let Some(path_end) = name.find("@@") else {
        // Not a shape we understand; treat it as already-plain text.
        return Cow::Borrowed(name)
    };

    let mut components = name[1..path_end].split('@').collect::<Vec<_>>();
    let () = components.reverse();
    Cow::Owned(components.join("::"))
}


#[cfg(test)]
mod tests {
    use super::*;


    /// Check that decorated names unmangle to their namespace-qualified
    /// form.
    #[test]
    fn decorated_names() {
        assert_eq!(
            unmangle_msvc("?ReadFile@@YA?AV?$Handle@VString@v8@@@v8@@PBD@Z"),
            "ReadFile"
        );
        assert_eq!(
            unmangle_msvc("?LookupInDescriptor@JSObject@internal@v8@@QAEXXZ"),
            "v8::internal::JSObject::LookupInDescriptor"
        );
        assert_eq!(
            unmangle_msvc("??1Utf8Value@String@v8@@QAE@XZ"),
            "v8::String::?1Utf8Value"
        );
    }

    /// Check that undecorated names pass through unchanged, including
    /// their leading underscores.
    #[test]
    fn undecorated_names() {
        assert_eq!(unmangle_msvc("_main"), "_main");
        assert_eq!(unmangle_msvc("_DllMain@12"), "_DllMain@12");
        assert_eq!(unmangle_msvc("___DllMainCRTStartup"), "___DllMainCRTStartup");
    }

    /// Make sure that unparsable decorated input is passed through
    /// rather than mangled further.
    #[test]
    fn unparsable_names() {
        assert_eq!(
            unmangle_msvc("??__Fnomem@?5???2@YAPAXI@Z@YAXXZ"),
            "??__Fnomem@?5???2@YAPAXI@Z@YAXXZ"
        );
        assert_eq!(unmangle_msvc("?"), "?");
    }
}
