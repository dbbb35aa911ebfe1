//! Lowering parsed sources into a module image
//!
//! Codegen is the second and final pass: it resolves identifiers against
//! the declared fields and parameters, classifies qualified type names as
//! enum or reference, and emits stack-machine bodies. Resolution failures
//! are reported as diagnostics against the statement's position; the pass
//! keeps going so every unresolved name in a file is reported at once.

use sable_core::{
    ClassDef, ClassKind, EnumDef, FieldDef, MethodDef, ModuleImage, Op, ParamDef, PropertyDef,
    TypeTag,
};
use std::collections::HashSet;

use crate::diagnostics::{codes, Diagnostic};
use crate::parser::{BinOp, ClassDecl, MethodDecl, Operand, SetStmt, SourceModule};

/// Outcome of lowering one parsed module
pub struct CodegenResult {
    pub image: ModuleImage,
    pub diagnostics: Vec<Diagnostic>,
}

/// Lower a parsed module into an image
///
/// `external_enums` names enums declared in the project's other source
/// files; a qualified type name classifies as an enum when either this
/// file or a sibling declares it, so lowering runs per file while enum
/// types stay project-wide.
pub fn lower(
    filename: &str,
    source: &SourceModule,
    external_enums: &HashSet<String>,
) -> CodegenResult {
    let mut diagnostics = Vec::new();
    let mut image = ModuleImage::new(&source.name);

    let mut enums: HashSet<String> = external_enums.clone();
    enums.extend(source.enums.iter().map(|e| e.name.clone()));

    for decl in &source.enums {
        image.enums.push(EnumDef {
            name: decl.name.clone(),
            underlying: decl.underlying.clone(),
            variants: decl.variants.clone(),
        });
    }

    for decl in &source.classes {
        image
            .classes
            .push(lower_class(filename, source, &enums, decl, &mut diagnostics));
    }

    CodegenResult { image, diagnostics }
}

fn lower_class(
    filename: &str,
    source: &SourceModule,
    enums: &HashSet<String>,
    decl: &ClassDecl,
    diagnostics: &mut Vec<Diagnostic>,
) -> ClassDef {
    let mut class = ClassDef::new(&decl.name);
    class.kind = if decl.is_interface {
        ClassKind::Interface
    } else {
        ClassKind::Class
    };

    // The first parent that is not a declared interface is the base
    // class; everything else lands in the implements list.
    for parent in &decl.parents {
        let is_interface = source
            .classes
            .iter()
            .any(|c| c.is_interface && c.name == *parent);
        if is_interface || class.extends.is_some() {
            class.implements.push(parent.clone());
        } else {
            class.extends = Some(parent.clone());
        }
    }

    for field in &decl.fields {
        class.fields.push(FieldDef {
            name: field.name.clone(),
            ty: classify(enums, &field.ty),
            is_static: field.is_static,
            readonly: field.readonly,
            default: field.default.clone(),
        });
    }

    for prop in &decl.properties {
        class.properties.push(PropertyDef {
            name: prop.name.clone(),
            ty: classify(enums, &prop.ty),
            is_static: prop.is_static,
            backing: format!("{}$backing", prop.name),
            can_read: prop.can_read,
            can_write: prop.can_write,
        });
    }

    for method in &decl.methods {
        class.methods.push(lower_method(
            filename,
            enums,
            &class,
            method,
            diagnostics,
        ));
    }

    class
}

fn lower_method(
    filename: &str,
    enums: &HashSet<String>,
    class: &ClassDef,
    decl: &MethodDecl,
    diagnostics: &mut Vec<Diagnostic>,
) -> MethodDef {
    let params: Vec<ParamDef> = decl
        .params
        .iter()
        .map(|p| ParamDef {
            name: p.name.clone(),
            ty: classify(enums, &p.ty),
            by_ref: p.by_ref,
        })
        .collect();

    let mut body = Vec::new();
    for stmt in &decl.body {
        lower_set(filename, class, decl, &params, stmt, &mut body, diagnostics);
    }
    if !body.is_empty() {
        body.push(Op::Ret);
    }

    MethodDef {
        name: decl.name.clone(),
        is_static: decl.is_static,
        params,
        body,
    }
}

fn lower_set(
    filename: &str,
    class: &ClassDef,
    method: &MethodDecl,
    params: &[ParamDef],
    stmt: &SetStmt,
    body: &mut Vec<Op>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let target = match class.field(&stmt.target) {
        Some(field) => field,
        None => {
            diagnostics.push(Diagnostic::error(
                filename,
                stmt.line,
                stmt.column,
                codes::UNKNOWN_IDENTIFIER,
                format!("`{}` is not a field of `{}`", stmt.target, class.name),
            ));
            return;
        }
    };
    if method.is_static && !target.is_static {
        diagnostics.push(Diagnostic::error(
            filename,
            stmt.line,
            stmt.column,
            codes::UNKNOWN_IDENTIFIER,
            format!(
                "instance field `{}` cannot be assigned from a static method",
                stmt.target
            ),
        ));
        return;
    }

    let mut ops = Vec::new();
    if !push_operand(
        filename, class, method, params, stmt, &stmt.expr.lhs, &mut ops, diagnostics,
    ) {
        return;
    }
    if let Some((op, rhs)) = &stmt.expr.rest {
        if !push_operand(filename, class, method, params, stmt, rhs, &mut ops, diagnostics) {
            return;
        }
        ops.push(match op {
            BinOp::Add => Op::Add,
            BinOp::Sub => Op::Sub,
            BinOp::Mul => Op::Mul,
        });
    }
    ops.push(if target.is_static {
        Op::StoreStatic(stmt.target.clone())
    } else {
        Op::StoreField(stmt.target.clone())
    });
    body.append(&mut ops);
}

#[allow(clippy::too_many_arguments)]
fn push_operand(
    filename: &str,
    class: &ClassDef,
    method: &MethodDecl,
    params: &[ParamDef],
    stmt: &SetStmt,
    operand: &Operand,
    ops: &mut Vec<Op>,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    match operand {
        Operand::Literal(value) => {
            ops.push(Op::LoadConst(value.clone()));
            true
        }
        Operand::Ident(name) => {
            if let Some(index) = params.iter().position(|p| p.name == *name) {
                ops.push(Op::LoadArg(index as u8));
                return true;
            }
            if let Some(field) = class.field(name) {
                if field.is_static {
                    ops.push(Op::LoadStatic(name.clone()));
                    return true;
                }
                if method.is_static {
                    diagnostics.push(Diagnostic::error(
                        filename,
                        stmt.line,
                        stmt.column,
                        codes::UNKNOWN_IDENTIFIER,
                        format!("instance field `{name}` cannot be read from a static method"),
                    ));
                    return false;
                }
                ops.push(Op::LoadField(name.clone()));
                return true;
            }
            diagnostics.push(Diagnostic::error(
                filename,
                stmt.line,
                stmt.column,
                codes::UNKNOWN_IDENTIFIER,
                format!("unknown identifier `{name}`"),
            ));
            false
        }
    }
}

/// Turn parser-level Ref names into Enum tags when any project source
/// declares that enum
fn classify(enums: &HashSet<String>, ty: &TypeTag) -> TypeTag {
    match ty {
        TypeTag::Ref(name) if enums.contains(name) => TypeTag::Enum(name.clone()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn lower_source(source: &str) -> CodegenResult {
        let parsed = parser::parse("test.sb", source);
        assert!(parsed.diagnostics.is_empty(), "{:?}", parsed.diagnostics);
        lower("test.sb", &parsed.module, &HashSet::new())
    }

    #[test]
    fn test_lowers_method_body() {
        let result = lower_source(
            "module demo\nclass demo.A\n  field X: i32 = 5\n  method Bump(by: i32)\n    set X = X + by\n  end\nend\n",
        );
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);

        let body = &result.image.classes[0].methods[0].body;
        assert_eq!(
            body,
            &vec![
                Op::LoadField("X".into()),
                Op::LoadArg(0),
                Op::Add,
                Op::StoreField("X".into()),
                Op::Ret,
            ]
        );
    }

    #[test]
    fn test_enum_types_are_classified() {
        let result = lower_source(
            "module demo\nenum demo.Mode : i32\n  Idle = 0\nend\nclass demo.A\n  field M: demo.Mode\nend\n",
        );
        assert_eq!(
            result.image.classes[0].fields[0].ty,
            TypeTag::Enum("demo.Mode".into())
        );
    }

    #[test]
    fn test_enum_declared_in_sibling_source_is_classified() {
        let consumer = parser::parse(
            "player.sb",
            "module demo\nclass demo.Player\n  field M: demo.Mode\n  method Set(m: demo.Mode)\n    set M = m\n  end\nend\n",
        );
        assert!(consumer.diagnostics.is_empty());

        let sibling_enums: HashSet<String> = ["demo.Mode".to_string()].into();
        let result = lower("player.sb", &consumer.module, &sibling_enums);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);

        let class = &result.image.classes[0];
        assert_eq!(class.fields[0].ty, TypeTag::Enum("demo.Mode".into()));
        assert_eq!(
            class.methods[0].params[0].ty,
            TypeTag::Enum("demo.Mode".into())
        );
    }

    #[test]
    fn test_interface_parent_goes_to_implements() {
        let result = lower_source(
            "module demo\ninterface demo.I\nend\nclass demo.Base\nend\nclass demo.A : demo.Base, demo.I\nend\n",
        );
        let class = &result.image.classes[2];
        assert_eq!(class.extends.as_deref(), Some("demo.Base"));
        assert_eq!(class.implements, vec!["demo.I".to_string()]);
    }

    #[test]
    fn test_unknown_identifier_is_reported() {
        let result = lower_source(
            "module demo\nclass demo.A\n  field X: i32\n  method F()\n    set X = missing\n  end\nend\n",
        );
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].code, codes::UNKNOWN_IDENTIFIER);
        assert_eq!(result.diagnostics[0].line, 5);
    }

    #[test]
    fn test_static_method_cannot_touch_instance_field() {
        let result = lower_source(
            "module demo\nclass demo.A\n  field X: i32\n  static method F()\n    set X = 1\n  end\nend\n",
        );
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].code, codes::UNKNOWN_IDENTIFIER);
    }

    #[test]
    fn test_property_gets_backing_slot() {
        let result =
            lower_source("module demo\nclass demo.A\n  prop Name: str { get set }\nend\n");
        let prop = &result.image.classes[0].properties[0];
        assert_eq!(prop.backing, "Name$backing");
        assert!(prop.can_read && prop.can_write);
    }
}
