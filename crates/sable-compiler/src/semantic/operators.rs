//! User-defined operator lookup and tag compatibility.
//!
//! Operator functions are declared under a canonical name built from the
//! token and the operand tags, so lookup is a plain scope walk. Tag
//! matching implements the documented coercion lattice; everything else is
//! a mismatch that warns (213) or fails silently depending on flags.

use sable_common::codes;
use sable_common::span::Span;

use crate::ast::nodes::UserOp;
use crate::semantic::analyzer::Analyzer;
use crate::semantic::symbols::{SymbolId, USAGE_READ};
use crate::semantic::value::{Ident, Tag, Value};

pub const MATCH_COERCE: u32 = 0x1;
pub const MATCH_SILENT: u32 = 0x2;
/// Operand-order-insensitive deduction for arithmetic; accepts like COERCE.
pub const MATCH_DEDUCE: u32 = 0x4;

/// Canonical symbol name of a user-defined operator.
pub fn operator_name(token: &str, tags: &[Tag]) -> String {
    match tags {
        [t] => format!("operator{token}({t})"),
        [t1, t2] => format!("operator{token}({t1},{t2})"),
        _ => unreachable!("operators take one or two operands"),
    }
}

fn is_commutative(token: &str) -> bool {
    matches!(token, "*" | "+" | "&" | "^" | "|" | "==" | "!=")
}

impl<'a> Analyzer<'a> {
    /// Find a user-defined operator for `(token, tag1, tag2)`.
    ///
    /// `token` is the operator spelling; `"="` looks up an assignment
    /// coercion operator, whose result tag must be the destination tag.
    /// Binary commutative operators are retried with swapped operands.
    pub(crate) fn find_userop(
        &mut self,
        token: &str,
        tag1: Tag,
        tag2: Tag,
        nargs: u32,
    ) -> Option<UserOp> {
        let builtin = |t: Tag| t == Tag::INT || t == self.cc.types.tag_bool();
        if token == "=" {
            // Coercion operators only apply across distinct tags.
            if tag1 == tag2 {
                return None;
            }
        } else if nargs == 1 {
            if builtin(tag1) {
                return None;
            }
        } else if builtin(tag1) && builtin(tag2) {
            return None;
        }

        let lookup = |this: &Self, t1: Tag, t2: Tag| -> Option<SymbolId> {
            let name = if token == "=" {
                operator_name(token, &[t2])
            } else if nargs == 1 {
                operator_name(token, &[t1])
            } else {
                operator_name(token, &[t1, t2])
            };
            let (sym, _) = this.cc.scopes.find(this.cx.scope, &name)?;
            let s = &this.cc.symbols[sym];
            if s.ident != Ident::Function || !s.is_operator {
                return None;
            }
            Some(sym)
        };

        let mut swapped = false;
        let mut found = lookup(self, tag1, tag2);
        if found.is_none()
            && nargs == 2
            && token != "="
            && tag1 != tag2
            && is_commutative(token)
        {
            found = lookup(self, tag2, tag1);
            swapped = found.is_some();
        }

        let sym = found?;
        let result_tag = self.cc.symbols[sym].tag;
        if token == "=" && result_tag != tag1 {
            return None;
        }
        self.cc.symbols.mark_usage(sym, USAGE_READ);
        Some(UserOp {
            sym,
            tag: result_tag,
            swapped,
        })
    }

    /// Whether `src` is acceptable where `dst` is expected.
    ///
    /// Compatible pairs return true silently. Mismatches return false under
    /// `MATCH_SILENT`; otherwise they warn (213) and are accepted only
    /// under `MATCH_COERCE`/`MATCH_DEDUCE`.
    pub(crate) fn match_tag(&mut self, dst: Tag, src: Tag, flags: u32, pos: Span) -> bool {
        if self.tags_compatible(dst, src) {
            return true;
        }
        if flags & MATCH_SILENT != 0 {
            return false;
        }
        let expected = self.type_name(dst);
        let got = self.type_name(src);
        self.report(
            codes::TAG_MISMATCH,
            pos,
            format!("tag mismatch (expected `{expected}`, got `{got}`)"),
        );
        flags & (MATCH_COERCE | MATCH_DEDUCE) != 0
    }

    /// Order-insensitive tag match; symmetric in its arguments.
    pub(crate) fn match_tag_commutative(&mut self, a: Tag, b: Tag, flags: u32, pos: Span) -> bool {
        if self.match_tag(a, b, flags | MATCH_SILENT, pos)
            || self.match_tag(b, a, flags | MATCH_SILENT, pos)
        {
            return true;
        }
        self.match_tag(a, b, flags, pos)
    }

    fn tags_compatible(&self, dst: Tag, src: Tag) -> bool {
        if dst == src {
            return true;
        }
        let types = &self.cc.types;
        if dst == types.tag_any() || src == types.tag_any() {
            return true;
        }
        let dst_ty = types.get(dst);
        if src == types.tag_null() {
            return dst_ty.is_methodmap() || dst_ty.is_object() || dst_ty.is_function();
        }
        if src == types.tag_nullfunc() {
            return dst_ty.is_function();
        }
        let src_ty = types.get(src);
        if let (Some(d), Some(s)) = (dst_ty.as_methodmap(), src_ty.as_methodmap()) {
            return types.methodmap_derives_from(s, d);
        }
        if dst_ty.is_function() && src_ty.is_function() {
            // Typeset entry selection is the emitter's concern.
            return true;
        }
        // A bool is just a cell.
        if src == types.tag_bool() && dst == Tag::INT {
            return true;
        }
        false
    }

    /// Values exempt from tag matching because one side is a string array
    /// or a packed character of one.
    pub(crate) fn checkval_string(&self, a: &Value, b: &Value) -> bool {
        self.is_string_value(a) || self.is_string_value(b)
    }

    fn is_string_value(&self, v: &Value) -> bool {
        v.tag == self.cc.types.tag_string()
            && matches!(
                v.ident,
                Ident::Array | Ident::RefArray | Ident::ArrayCell | Ident::ArrayChar
            )
    }

    /// Whether a string-typed formal is satisfied by a string-ish value.
    pub(crate) fn checktag_string(&self, arg_tag: Tag, v: &Value) -> bool {
        arg_tag == self.cc.types.tag_string() && self.is_string_value(v)
    }

    /// Array-ish string values skip the return-tag check.
    pub(crate) fn matchtag_string(&self, ident: Ident, tag: Tag) -> bool {
        ident.is_array_kind() && tag == self.cc.types.tag_string()
    }

    /// Shorthand for a coercing tag check.
    pub(crate) fn checktag(&mut self, dst: Tag, src: Tag, pos: Span) -> bool {
        self.match_tag(dst, src, MATCH_COERCE, pos)
    }

    /// Tags that may index an array.
    pub(crate) fn is_valid_index_tag(&self, tag: Tag) -> bool {
        let types = &self.cc.types;
        tag == Tag::INT
            || tag == types.tag_bool()
            || tag == types.tag_any()
            || tag == types.tag_string()
            || types.get(tag).is_enum()
    }

    /// Declaration-level checks for user-defined operators: comparisons and
    /// negation must yield bool, and no operator may return void.
    pub(crate) fn check_operator_decl(&mut self, token: &str, ret: Tag, pos: Span) {
        let bool_tag = self.cc.types.tag_bool();
        let void_tag = self.cc.types.tag_void();
        if matches!(token, "==" | "!=" | "<" | "<=" | ">" | ">=" | "!") {
            if ret != bool_tag {
                self.report(
                    codes::COMPARE_OP_MUST_RETURN_BOOL,
                    pos,
                    format!("user-defined operator `{token}` must return bool"),
                );
            }
        } else if ret == void_tag {
            self.report(
                codes::VOID_NOT_ALLOWED,
                pos,
                format!("user-defined operator `{token}` may not return void"),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::testutil::TestUnit;

    #[test]
    fn operator_names_are_canonical() {
        assert_eq!(operator_name("+", &[Tag(5), Tag(5)]), "operator+(5,5)");
        assert_eq!(operator_name("!", &[Tag(7)]), "operator!(7)");
    }

    #[test]
    fn equal_and_any_tags_match_silently() {
        let mut unit = TestUnit::new();
        unit.with_analyzer(|a| {
            let any = a.cc.types.tag_any();
            assert!(a.match_tag(Tag(5), Tag(5), 0, Span::dummy()));
            assert!(a.match_tag(any, Tag(5), 0, Span::dummy()));
            assert!(a.match_tag(Tag(5), any, 0, Span::dummy()));
        });
        assert!(unit.codes().is_empty());
    }

    #[test]
    fn bool_narrows_to_int_silently() {
        let mut unit = TestUnit::new();
        unit.with_analyzer(|a| {
            let b = a.cc.types.tag_bool();
            assert!(a.match_tag(Tag::INT, b, 0, Span::dummy()));
            // The reverse direction is a coercion and warns.
            assert!(!a.match_tag(b, Tag::INT, 0, Span::dummy()));
        });
        assert_eq!(unit.codes(), vec![codes::TAG_MISMATCH]);
    }

    #[test]
    fn mismatch_is_silent_under_silent_flag() {
        let mut unit = TestUnit::new();
        unit.with_analyzer(|a| {
            let f = a.cc.types.tag_float();
            assert!(!a.match_tag(Tag::INT, f, MATCH_SILENT, Span::dummy()));
            assert!(a.match_tag(Tag::INT, f, MATCH_COERCE, Span::dummy()));
        });
        assert_eq!(unit.codes(), vec![codes::TAG_MISMATCH]);
    }

    #[test]
    fn commutative_match_is_symmetric() {
        let mut unit = TestUnit::new();
        unit.with_analyzer(|a| {
            let b = a.cc.types.tag_bool();
            let f = a.cc.types.tag_float();
            for (x, y) in [(Tag::INT, b), (f, Tag::INT), (f, b)] {
                let xy = a.match_tag_commutative(x, y, MATCH_SILENT, Span::dummy());
                let yx = a.match_tag_commutative(y, x, MATCH_SILENT, Span::dummy());
                assert_eq!(xy, yx);
            }
        });
    }

    #[test]
    fn null_matches_methodmaps_and_objects() {
        let mut unit = TestUnit::new();
        let map_tag = unit.declare_methodmap("Handle", None).1;
        unit.with_analyzer(|a| {
            let null = a.cc.types.tag_null();
            let obj = a.cc.types.tag_object();
            assert!(a.match_tag(map_tag, null, 0, Span::dummy()));
            assert!(a.match_tag(obj, null, 0, Span::dummy()));
            assert!(!a.match_tag(Tag::INT, null, MATCH_SILENT, Span::dummy()));
        });
    }

    #[test]
    fn derived_methodmap_matches_base() {
        let mut unit = TestUnit::new();
        let (base_id, base_tag) = unit.declare_methodmap("Entity", None);
        let (_, derived_tag) = unit.declare_methodmap("Player", Some(base_id));
        unit.with_analyzer(|a| {
            assert!(a.match_tag(base_tag, derived_tag, 0, Span::dummy()));
            assert!(!a.match_tag(derived_tag, base_tag, MATCH_SILENT, Span::dummy()));
        });
    }

    #[test]
    fn userop_lookup_and_swap() {
        let mut unit = TestUnit::new();
        let float = unit.float_tag();
        let op = unit.declare_operator("*", &[float, Tag::INT], float);
        unit.with_analyzer(|a| {
            let found = a.find_userop("*", float, Tag::INT, 2).unwrap();
            assert_eq!(found.sym, op);
            assert!(!found.swapped);

            // Swapped operand order still resolves, flagged as swapped.
            let found = a.find_userop("*", Tag::INT, float, 2).unwrap();
            assert_eq!(found.sym, op);
            assert!(found.swapped);

            // Plain int operands never find a user operator.
            assert!(a.find_userop("*", Tag::INT, Tag::INT, 2).is_none());
        });
    }

    #[test]
    fn assignment_coercion_operator_requires_result_tag() {
        let mut unit = TestUnit::new();
        let float = unit.float_tag();
        let op = unit.declare_operator("=", &[Tag::INT], float);
        unit.with_analyzer(|a| {
            // int -> float coercion resolves.
            let found = a.find_userop("=", float, Tag::INT, 2).unwrap();
            assert_eq!(found.sym, op);
            // Same tags never coerce.
            assert!(a.find_userop("=", float, float, 2).is_none());
            // Result tag must match the destination.
            assert!(a.find_userop("=", Tag::INT, Tag::INT, 2).is_none());
        });
    }
}
