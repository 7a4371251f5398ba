//! The macro expansion engine.
//!
//! Given one file's syntax tree plus the build snapshots, rewrites the tree
//! until no resolvable macro call sites remain. Discarded conditional
//! branches are deleted from the output entirely - whatever they contain
//! (unresolvable imports, broken references) never reaches a later stage.
//!
//! Expansion of distinct files may run on independent workers: the expander
//! only holds shared read-only snapshots, and each `expand` call owns its
//! tree.

use tracing::{debug, trace};

use gantry_core::{BuildConfig, ModuleInventory, VersionGraph};

use crate::ast::{
    ArrowBody, ArrowFunctionExpression, BlockStatement, CallExpression, Expression,
    ExpressionStatement, ForOfStatement, IfStatement, Literal, MemberProperty, NewExpression,
    Program, ReturnStatement, Span, Statement, ThrowStatement, build,
};
use crate::error::{ExpandError, Result};
use crate::eval::Evaluator;
use crate::resolver::CompileResolver;

/// Upper bound on scan/evaluate/rewrite passes over one file.
const MAX_PASSES: u32 = 10;

/// Identifier the runtime helper module is bound to in deferred rewrites.
/// Orchestration wires this binding to the RuntimeConfig-backed helper.
pub const RUNTIME_BINDING: &str = "__gantry_runtime__";

/// The macro vocabulary: the only names source files may use to interact
/// with the expansion engine.
pub const MACRO_NAMES: &[&str] = &[
    "macroCondition",
    "dependencySatisfies",
    "getConfig",
    "getOwnConfig",
    "importSync",
    "each",
    "isTesting",
    "isDevelopingApp",
];

/// Per-file context for one expansion.
#[derive(Debug, Clone)]
pub struct FileContext {
    /// Path of the file being expanded, for diagnostics
    pub filename: String,
    /// Identity of the package the file belongs to
    pub package: String,
}

/// The macro expansion engine. One instance serves a whole build.
pub struct Expander<'a> {
    config: &'a BuildConfig,
    versions: &'a VersionGraph,
    resolver: CompileResolver<'a>,
    runtime_deferrable: bool,
}

impl<'a> Expander<'a> {
    /// Create an expander over the build's shared snapshots.
    pub fn new(
        config: &'a BuildConfig,
        versions: &'a VersionGraph,
        inventory: &'a ModuleInventory,
        extensions: Vec<String>,
    ) -> Self {
        Self {
            config,
            versions,
            resolver: CompileResolver::new(inventory, extensions),
            runtime_deferrable: false,
        }
    }

    /// Allow predicates with no definite build-time value to defer to the
    /// runtime helper instead of failing (library builds).
    ///
    /// A definite build-time value always wins over deferral; deferral only
    /// applies where no static value exists.
    pub fn runtime_deferrable(mut self, on: bool) -> Self {
        self.runtime_deferrable = on;
        self
    }

    /// Expand every resolvable macro call site in `program`.
    ///
    /// Runs scan/evaluate/rewrite passes to fixpoint; rewriting one call site
    /// can expose new ones (a retained branch containing another macro).
    pub fn expand(&self, file: &FileContext, mut program: Program) -> Result<Program> {
        for pass in 1..=MAX_PASSES {
            let mut cx = Pass {
                ex: self,
                file,
                rewrites: 0,
            };
            program.body = cx.rewrite_statements(program.body)?;
            if cx.rewrites == 0 {
                debug!("Expanded {} in {} passes", file.filename, pass);
                return Ok(program);
            }
            trace!(
                "Pass {} rewrote {} call sites in {}",
                pass, cx.rewrites, file.filename
            );
        }
        Err(ExpandError::NonConvergence {
            file: file.filename.clone(),
            passes: MAX_PASSES,
        })
    }
}

/// One rewrite pass over one file.
struct Pass<'p, 'a> {
    ex: &'p Expander<'a>,
    file: &'p FileContext,
    rewrites: usize,
}

impl Pass<'_, '_> {
    fn evaluator(&self) -> Evaluator<'_> {
        Evaluator {
            config: self.ex.config,
            versions: self.ex.versions,
            own_package: &self.file.package,
            file: &self.file.filename,
        }
    }

    fn rewrite_statements(&mut self, stmts: Vec<Statement>) -> Result<Vec<Statement>> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            self.rewrite_statement_into(stmt, &mut out)?;
        }
        Ok(out)
    }

    /// Rewrite one statement into an output list; branch splicing and `each`
    /// unrolling may push zero or several statements.
    fn rewrite_statement_into(&mut self, stmt: Statement, out: &mut Vec<Statement>) -> Result<()> {
        match stmt {
            Statement::If(node) if macro_call(&node.test, "macroCondition").is_some() => {
                self.rewrite_macro_condition_stmt(node, out)
            }
            Statement::If(node) => {
                let test = self.rewrite_expression(node.test)?;
                let consequent = Box::new(self.rewrite_statement(*node.consequent)?);
                let alternate = match node.alternate {
                    Some(branch) => Some(Box::new(self.rewrite_statement(*branch)?)),
                    None => None,
                };
                out.push(Statement::If(IfStatement {
                    test,
                    consequent,
                    alternate,
                }));
                Ok(())
            }
            Statement::ForOf(node) if macro_call(&node.right, "each").is_some() => {
                self.unroll_each(node, out)
            }
            Statement::ForOf(node) => {
                let right = self.rewrite_expression(node.right)?;
                let body = Box::new(self.rewrite_statement(*node.body)?);
                out.push(Statement::ForOf(ForOfStatement {
                    kind: node.kind,
                    binding: node.binding,
                    right,
                    body,
                }));
                Ok(())
            }
            Statement::Block(block) => {
                let body = self.rewrite_statements(block.body)?;
                out.push(Statement::Block(BlockStatement { body }));
                Ok(())
            }
            Statement::Expression(es) => {
                let expression = self.rewrite_expression(es.expression)?;
                out.push(Statement::Expression(ExpressionStatement { expression }));
                Ok(())
            }
            Statement::VariableDeclaration(mut decl) => {
                for declarator in &mut decl.declarations {
                    if let Some(init) = declarator.init.take() {
                        declarator.init = Some(self.rewrite_expression(init)?);
                    }
                }
                out.push(Statement::VariableDeclaration(decl));
                Ok(())
            }
            Statement::FunctionDeclaration(mut func) => {
                func.body = self.rewrite_statements(func.body)?;
                out.push(Statement::FunctionDeclaration(func));
                Ok(())
            }
            Statement::Return(node) => {
                let argument = match node.argument {
                    Some(argument) => Some(self.rewrite_expression(argument)?),
                    None => None,
                };
                out.push(Statement::Return(ReturnStatement { argument }));
                Ok(())
            }
            Statement::Throw(node) => {
                let argument = self.rewrite_expression(node.argument)?;
                out.push(Statement::Throw(ThrowStatement { argument }));
                Ok(())
            }
            Statement::Empty => {
                out.push(Statement::Empty);
                Ok(())
            }
        }
    }

    fn rewrite_statement(&mut self, stmt: Statement) -> Result<Statement> {
        let mut out = Vec::with_capacity(1);
        self.rewrite_statement_into(stmt, &mut out)?;
        if out.len() == 1 {
            Ok(out.remove(0))
        } else {
            Ok(Statement::Block(BlockStatement { body: out }))
        }
    }

    /// `if (macroCondition(pred)) ... else ...` - splice the retained branch in
    /// place and delete the discarded one, or defer the predicate.
    fn rewrite_macro_condition_stmt(
        &mut self,
        node: IfStatement,
        out: &mut Vec<Statement>,
    ) -> Result<()> {
        let (predicate, span) = self.macro_condition_predicate(&node.test)?;
        let reduced = self.evaluator().reduce(&predicate)?;
        match reduced {
            Some(value) => {
                self.rewrites += 1;
                let retained = if value.truthy() {
                    Some(*node.consequent)
                } else {
                    node.alternate.map(|branch| *branch)
                };
                // The discarded branch is dropped here without further
                // examination; spliced content is rescanned next pass.
                if let Some(branch) = retained {
                    splice_into(branch, out);
                }
                Ok(())
            }
            None if self.ex.runtime_deferrable => {
                self.rewrites += 1;
                let test = self.defer_predicate(predicate)?;
                let consequent = Box::new(self.rewrite_statement(*node.consequent)?);
                let alternate = match node.alternate {
                    Some(branch) => Some(Box::new(self.rewrite_statement(*branch)?)),
                    None => None,
                };
                out.push(Statement::If(IfStatement {
                    test,
                    consequent,
                    alternate,
                }));
                Ok(())
            }
            None => Err(ExpandError::static_eval(
                &self.file.filename,
                span,
                "predicate is not statically known",
            )),
        }
    }

    /// `for (... of each(arr)) { ... }` - unroll one copy of the body per
    /// element, substituting the loop binding.
    fn unroll_each(&mut self, node: ForOfStatement, out: &mut Vec<Statement>) -> Result<()> {
        let call = match node.right {
            Expression::Call(call) => call,
            _ => unreachable!("guarded by macro_call"),
        };
        let span = call.span;
        if call.arguments.len() != 1 {
            return Err(ExpandError::static_eval(
                &self.file.filename,
                span,
                "each requires exactly one argument",
            ));
        }
        let elements = match call.arguments.into_iter().next() {
            Some(Expression::Array(array)) => array.elements,
            _ => {
                return Err(ExpandError::static_eval(
                    &self.file.filename,
                    span,
                    "each requires a literal array",
                ));
            }
        };
        self.rewrites += 1;
        for element in elements {
            let mut copy = (*node.body).clone();
            substitute_stmt(&mut copy, &node.binding.name, &element);
            splice_into(copy, out);
        }
        Ok(())
    }

    fn rewrite_expression(&mut self, expr: Expression) -> Result<Expression> {
        match expr {
            Expression::Call(call) => {
                if let Expression::Identifier(callee) = call.callee.as_ref() {
                    match callee.name.as_str() {
                        "importSync" => return self.rewrite_import_sync(call),
                        "dependencySatisfies" | "getConfig" | "getOwnConfig" | "isTesting"
                        | "isDevelopingApp" => return self.rewrite_value_macro(call),
                        "macroCondition" => {
                            return Err(ExpandError::static_eval(
                                &self.file.filename,
                                call.span,
                                "macroCondition must be the test of a conditional",
                            ));
                        }
                        "each" => {
                            return Err(ExpandError::static_eval(
                                &self.file.filename,
                                call.span,
                                "each must be the iterated expression of a for...of loop",
                            ));
                        }
                        _ => {}
                    }
                }
                let callee = Box::new(self.rewrite_expression(*call.callee)?);
                let arguments = call
                    .arguments
                    .into_iter()
                    .map(|argument| self.rewrite_expression(argument))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Expression::Call(CallExpression {
                    callee,
                    arguments,
                    span: call.span,
                }))
            }
            Expression::Conditional(node)
                if macro_call(&node.test, "macroCondition").is_some() =>
            {
                let (predicate, span) = self.macro_condition_predicate(&node.test)?;
                let reduced = self.evaluator().reduce(&predicate)?;
                match reduced {
                    Some(value) => {
                        self.rewrites += 1;
                        // Chosen branch is rescanned next pass; the other is
                        // deleted here.
                        if value.truthy() {
                            Ok(*node.consequent)
                        } else {
                            Ok(*node.alternate)
                        }
                    }
                    None if self.ex.runtime_deferrable => {
                        self.rewrites += 1;
                        let test = Box::new(self.defer_predicate(predicate)?);
                        let consequent = Box::new(self.rewrite_expression(*node.consequent)?);
                        let alternate = Box::new(self.rewrite_expression(*node.alternate)?);
                        Ok(Expression::Conditional(crate::ast::ConditionalExpression {
                            test,
                            consequent,
                            alternate,
                        }))
                    }
                    None => Err(ExpandError::static_eval(
                        &self.file.filename,
                        span,
                        "predicate is not statically known",
                    )),
                }
            }
            Expression::Conditional(node) => {
                Ok(Expression::Conditional(crate::ast::ConditionalExpression {
                    test: Box::new(self.rewrite_expression(*node.test)?),
                    consequent: Box::new(self.rewrite_expression(*node.consequent)?),
                    alternate: Box::new(self.rewrite_expression(*node.alternate)?),
                }))
            }
            Expression::Unary(mut node) => {
                node.argument = Box::new(self.rewrite_expression(*node.argument)?);
                Ok(Expression::Unary(node))
            }
            Expression::Binary(mut node) => {
                node.left = Box::new(self.rewrite_expression(*node.left)?);
                node.right = Box::new(self.rewrite_expression(*node.right)?);
                Ok(Expression::Binary(node))
            }
            Expression::Member(mut node) => {
                node.object = Box::new(self.rewrite_expression(*node.object)?);
                if let MemberProperty::Computed(index) = node.property {
                    node.property =
                        MemberProperty::Computed(Box::new(self.rewrite_expression(*index)?));
                }
                Ok(Expression::Member(node))
            }
            Expression::New(mut node) => {
                node.callee = Box::new(self.rewrite_expression(*node.callee)?);
                node.arguments = node
                    .arguments
                    .into_iter()
                    .map(|argument| self.rewrite_expression(argument))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Expression::New(node))
            }
            Expression::Array(mut node) => {
                node.elements = node
                    .elements
                    .into_iter()
                    .map(|element| self.rewrite_expression(element))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Expression::Array(node))
            }
            Expression::Object(mut node) => {
                for property in &mut node.properties {
                    let value = std::mem::replace(
                        &mut property.value,
                        Expression::Literal(Literal::Undefined),
                    );
                    property.value = self.rewrite_expression(value)?;
                }
                Ok(Expression::Object(node))
            }
            Expression::Arrow(node) => {
                let body = match node.body {
                    ArrowBody::Expression(expr) => {
                        ArrowBody::Expression(Box::new(self.rewrite_expression(*expr)?))
                    }
                    ArrowBody::Block(body) => ArrowBody::Block(self.rewrite_statements(body)?),
                };
                Ok(Expression::Arrow(ArrowFunctionExpression {
                    params: node.params,
                    body,
                }))
            }
            Expression::Literal(_) | Expression::Identifier(_) => Ok(expr),
        }
    }

    /// `importSync(spec)` - resolved targets become direct `require` calls;
    /// unresolved targets defer the failure into the emitted program.
    fn rewrite_import_sync(&mut self, call: CallExpression) -> Result<Expression> {
        let span = call.span;
        let specifier = match call.arguments.as_slice() {
            [Expression::Literal(Literal::String(specifier))] => specifier.clone(),
            _ => {
                return Err(ExpandError::static_eval(
                    &self.file.filename,
                    span,
                    "importSync requires a literal string specifier",
                ));
            }
        };
        self.rewrites += 1;
        match self.ex.resolver.resolve(&specifier, &self.file.package) {
            Some(resolved) => Ok(require_call(&resolved, span)),
            None => {
                debug!(
                    "importSync {} unresolved in {}; deferring failure to runtime",
                    specifier, self.file.filename
                );
                Ok(missing_module_throw(&specifier))
            }
        }
    }

    /// A value-position macro: bake the static value in, or defer.
    fn rewrite_value_macro(&mut self, call: CallExpression) -> Result<Expression> {
        let span = call.span;
        let name = match call.callee.as_ref() {
            Expression::Identifier(id) => id.name.clone(),
            _ => unreachable!("guarded by caller"),
        };
        let reduced = self.evaluator().reduce(&Expression::Call(call.clone()))?;
        match reduced {
            Some(value) => {
                self.rewrites += 1;
                Ok(value.to_expression())
            }
            None if self.ex.runtime_deferrable => {
                self.rewrites += 1;
                self.defer_call(call)
            }
            None => Err(ExpandError::static_eval(
                &self.file.filename,
                span,
                format!("value of `{}` is not statically known", name),
            )),
        }
    }

    /// Rewrite a macro call into its runtime-helper equivalent.
    fn defer_call(&self, call: CallExpression) -> Result<Expression> {
        let span = call.span;
        let name = match call.callee.as_ref() {
            Expression::Identifier(id) => id.name.clone(),
            _ => String::new(),
        };
        let (method, arguments) = match name.as_str() {
            "isTesting" => ("isTesting", Vec::new()),
            "isDevelopingApp" => ("isDevelopingApp", Vec::new()),
            "getConfig" => ("config", call.arguments),
            "getOwnConfig" => ("config", vec![build::string(&self.file.package)]),
            _ => {
                return Err(ExpandError::static_eval(
                    &self.file.filename,
                    span,
                    format!("`{}` cannot be deferred to runtime", name),
                ));
            }
        };
        Ok(Expression::Call(CallExpression {
            callee: Box::new(build::member(build::ident(RUNTIME_BINDING), method)),
            arguments,
            span,
        }))
    }

    /// Rewrite a non-static predicate for runtime evaluation: macro calls
    /// become runtime-helper calls, statically-known parts still bake in.
    fn defer_predicate(&mut self, predicate: Expression) -> Result<Expression> {
        match predicate {
            Expression::Call(call) => {
                let name = match call.callee.as_ref() {
                    Expression::Identifier(id) => id.name.clone(),
                    _ => String::new(),
                };
                match name.as_str() {
                    "isTesting" | "isDevelopingApp" | "getConfig" | "getOwnConfig" => {
                        self.defer_call(call)
                    }
                    // Always statically answerable, even inside a deferred
                    // predicate.
                    "dependencySatisfies" => {
                        let span = call.span;
                        let reduced = self.evaluator().reduce(&Expression::Call(call))?;
                        match reduced {
                            Some(value) => Ok(value.to_expression()),
                            None => Err(ExpandError::static_eval(
                                &self.file.filename,
                                span,
                                "dependencySatisfies could not be evaluated",
                            )),
                        }
                    }
                    "macroCondition" | "importSync" | "each" => Err(ExpandError::static_eval(
                        &self.file.filename,
                        call.span,
                        format!("`{}` cannot appear in a deferred predicate", name),
                    )),
                    _ => self.rewrite_expression(Expression::Call(call)),
                }
            }
            Expression::Unary(mut node) => {
                node.argument = Box::new(self.defer_predicate(*node.argument)?);
                Ok(Expression::Unary(node))
            }
            Expression::Binary(mut node) => {
                node.left = Box::new(self.defer_predicate(*node.left)?);
                node.right = Box::new(self.defer_predicate(*node.right)?);
                Ok(Expression::Binary(node))
            }
            Expression::Conditional(mut node) => {
                node.test = Box::new(self.defer_predicate(*node.test)?);
                node.consequent = Box::new(self.defer_predicate(*node.consequent)?);
                node.alternate = Box::new(self.defer_predicate(*node.alternate)?);
                Ok(Expression::Conditional(node))
            }
            Expression::Member(mut node) => {
                node.object = Box::new(self.defer_predicate(*node.object)?);
                Ok(Expression::Member(node))
            }
            other => self.rewrite_expression(other),
        }
    }

    fn macro_condition_predicate(&self, test: &Expression) -> Result<(Expression, Span)> {
        let call = match test {
            Expression::Call(call) => call,
            _ => unreachable!("guarded by macro_call"),
        };
        if call.arguments.len() != 1 {
            return Err(ExpandError::static_eval(
                &self.file.filename,
                call.span,
                "macroCondition requires exactly one argument",
            ));
        }
        Ok((call.arguments[0].clone(), call.span))
    }
}

/// True when `expr` is a call of the bare identifier `name`.
fn macro_call<'e>(expr: &'e Expression, name: &str) -> Option<&'e CallExpression> {
    match expr {
        Expression::Call(call) => match call.callee.as_ref() {
            Expression::Identifier(id) if id.name == name => Some(call),
            _ => None,
        },
        _ => None,
    }
}

/// Push a statement, splicing block bodies as siblings.
fn splice_into(stmt: Statement, out: &mut Vec<Statement>) {
    match stmt {
        Statement::Block(block) => out.extend(block.body),
        other => out.push(other),
    }
}

fn require_call(resolved: &str, span: Span) -> Expression {
    Expression::Call(CallExpression {
        callee: Box::new(build::ident("require")),
        arguments: vec![build::string(resolved)],
        span,
    })
}

/// `(() => { throw new Error("Could not find module `spec`"); })()` - a
/// drop-in expression that only fails if actually executed.
fn missing_module_throw(specifier: &str) -> Expression {
    let message = format!("Could not find module `{}`", specifier);
    let throw = Statement::Throw(ThrowStatement {
        argument: Expression::New(NewExpression {
            callee: Box::new(build::ident("Error")),
            arguments: vec![build::string(&message)],
        }),
    });
    Expression::Call(CallExpression {
        callee: Box::new(Expression::Arrow(ArrowFunctionExpression {
            params: Vec::new(),
            body: ArrowBody::Block(vec![throw]),
        })),
        arguments: Vec::new(),
        span: Span::default(),
    })
}

/// Substitute every free occurrence of `name` in a statement.
fn substitute_stmt(stmt: &mut Statement, name: &str, replacement: &Expression) {
    match stmt {
        Statement::VariableDeclaration(decl) => {
            for declarator in &mut decl.declarations {
                if let Some(init) = &mut declarator.init {
                    substitute_expr(init, name, replacement);
                }
            }
        }
        Statement::FunctionDeclaration(func) => {
            if func.id.name != name && !func.params.iter().any(|p| p.name == name) {
                for inner in &mut func.body {
                    substitute_stmt(inner, name, replacement);
                }
            }
        }
        Statement::Expression(es) => substitute_expr(&mut es.expression, name, replacement),
        Statement::Block(block) => {
            for inner in &mut block.body {
                substitute_stmt(inner, name, replacement);
            }
        }
        Statement::If(node) => {
            substitute_expr(&mut node.test, name, replacement);
            substitute_stmt(&mut node.consequent, name, replacement);
            if let Some(alternate) = &mut node.alternate {
                substitute_stmt(alternate, name, replacement);
            }
        }
        Statement::ForOf(node) => {
            substitute_expr(&mut node.right, name, replacement);
            // The loop binding shadows the substituted name inside the body.
            if node.binding.name != name {
                substitute_stmt(&mut node.body, name, replacement);
            }
        }
        Statement::Return(node) => {
            if let Some(argument) = &mut node.argument {
                substitute_expr(argument, name, replacement);
            }
        }
        Statement::Throw(node) => substitute_expr(&mut node.argument, name, replacement),
        Statement::Empty => {}
    }
}

fn substitute_expr(expr: &mut Expression, name: &str, replacement: &Expression) {
    match expr {
        Expression::Identifier(id) if id.name == name => *expr = replacement.clone(),
        Expression::Identifier(_) | Expression::Literal(_) => {}
        Expression::Array(node) => {
            for element in &mut node.elements {
                substitute_expr(element, name, replacement);
            }
        }
        Expression::Object(node) => {
            for property in &mut node.properties {
                substitute_expr(&mut property.value, name, replacement);
            }
        }
        Expression::Unary(node) => substitute_expr(&mut node.argument, name, replacement),
        Expression::Binary(node) => {
            substitute_expr(&mut node.left, name, replacement);
            substitute_expr(&mut node.right, name, replacement);
        }
        Expression::Call(node) => {
            substitute_expr(&mut node.callee, name, replacement);
            for argument in &mut node.arguments {
                substitute_expr(argument, name, replacement);
            }
        }
        Expression::New(node) => {
            substitute_expr(&mut node.callee, name, replacement);
            for argument in &mut node.arguments {
                substitute_expr(argument, name, replacement);
            }
        }
        Expression::Member(node) => {
            substitute_expr(&mut node.object, name, replacement);
            if let MemberProperty::Computed(index) = &mut node.property {
                substitute_expr(index, name, replacement);
            }
        }
        Expression::Conditional(node) => {
            substitute_expr(&mut node.test, name, replacement);
            substitute_expr(&mut node.consequent, name, replacement);
            substitute_expr(&mut node.alternate, name, replacement);
        }
        Expression::Arrow(node) => {
            if !node.params.iter().any(|p| p.name == name) {
                match &mut node.body {
                    ArrowBody::Expression(body) => substitute_expr(body, name, replacement),
                    ArrowBody::Block(body) => {
                        for inner in body {
                            substitute_stmt(inner, name, replacement);
                        }
                    }
                }
            }
        }
    }
}
