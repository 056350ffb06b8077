//! Traversal framework: post-order and linear-execution walks.
//!
//! Walks are driven by an explicit task stack, never by recursion, so deeply
//! nested trees cannot overflow the call stack. Child lists are captured as
//! ids when a node is scanned; a visitor that overwrites the current slot
//! does not disturb tasks already queued, which is exactly the behavior the
//! rewriting passes rely on.

use crate::ir::expr::{ExprArena, ExprId, ExprKind};
use crate::ir::iteration::Operands;
use crate::ir::module::Function;

/// Post-order visitor over a function body.
pub trait Visitor {
    /// Runs before a node's children are scanned.
    fn pre_visit(&mut self, _func: &mut Function, _id: ExprId) {}

    /// Runs after a node's children have been visited.
    fn visit(&mut self, func: &mut Function, id: ExprId);

    /// Runs after `visit`, once the node is completely done.
    fn post_visit(&mut self, _func: &mut Function, _id: ExprId) {}
}

enum Task {
    Scan(ExprId),
    Visit(ExprId),
    Post(ExprId),
    NoteNonLinear(ExprId),
}

/// Children of a node in execution order: structural children first where
/// the format dictates (if condition before arms), operands otherwise.
fn push_child_scans(arena: &ExprArena, id: ExprId, stack: &mut Vec<Task>) {
    // pushed in reverse so the first child is popped first
    match &arena[id].kind {
        ExprKind::Block { list, .. } => {
            for &child in list.iter().rev() {
                stack.push(Task::Scan(child));
            }
        }
        ExprKind::If {
            condition,
            if_true,
            if_false,
        } => {
            if let Some(if_false) = if_false {
                stack.push(Task::Scan(*if_false));
            }
            stack.push(Task::Scan(*if_true));
            stack.push(Task::Scan(*condition));
        }
        ExprKind::Loop { body, .. } => {
            stack.push(Task::Scan(*body));
        }
        _ => {
            let expr = &arena[id];
            let operands: Vec<ExprId> = Operands::new(expr).collect();
            for child in operands.into_iter().rev() {
                stack.push(Task::Scan(child));
            }
        }
    }
}

/// Walks `root` post-order, visiting every node after its children.
pub fn walk<V: Visitor>(visitor: &mut V, func: &mut Function, root: ExprId) {
    let mut stack = vec![Task::Scan(root)];
    while let Some(task) = stack.pop() {
        match task {
            Task::Scan(id) => {
                visitor.pre_visit(func, id);
                stack.push(Task::Post(id));
                stack.push(Task::Visit(id));
                push_child_scans(&func.arena, id, &mut stack);
            }
            Task::Visit(id) => visitor.visit(func, id),
            Task::Post(id) => visitor.post_visit(func, id),
            Task::NoteNonLinear(_) => unreachable!(),
        }
    }
}

/// Visitor for linear-execution walks: `note_non_linear` fires wherever the
/// straight-line trace is interrupted. That is at a loop top before its
/// body, after a named block's list, around if arms, and before breaks,
/// switches, returns, and unreachables.
pub trait LinearVisitor {
    fn visit(&mut self, _func: &mut Function, _id: ExprId) {}

    fn note_non_linear(&mut self, _func: &mut Function, _id: ExprId) {}
}

/// Walks `root` post-order with non-linearity notes.
pub fn walk_linear<V: LinearVisitor>(visitor: &mut V, func: &mut Function, root: ExprId) {
    let mut stack = vec![Task::Scan(root)];
    while let Some(task) = stack.pop() {
        match task {
            Task::Scan(id) => {
                // pushed in reverse execution order
                match &func.arena[id].kind {
                    ExprKind::Block { name, list } => {
                        stack.push(Task::Visit(id));
                        if name.is_some() {
                            stack.push(Task::NoteNonLinear(id));
                        }
                        for &child in list.iter().rev() {
                            stack.push(Task::Scan(child));
                        }
                    }
                    ExprKind::If {
                        condition,
                        if_true,
                        if_false,
                    } => {
                        stack.push(Task::Visit(id));
                        stack.push(Task::NoteNonLinear(id));
                        if let Some(if_false) = if_false {
                            stack.push(Task::Scan(*if_false));
                            stack.push(Task::NoteNonLinear(id));
                        }
                        stack.push(Task::Scan(*if_true));
                        stack.push(Task::NoteNonLinear(id));
                        stack.push(Task::Scan(*condition));
                    }
                    ExprKind::Loop { body, .. } => {
                        stack.push(Task::Visit(id));
                        stack.push(Task::Scan(*body));
                        stack.push(Task::NoteNonLinear(id));
                    }
                    ExprKind::Break { .. }
                    | ExprKind::Switch { .. }
                    | ExprKind::Return { .. }
                    | ExprKind::Unreachable => {
                        stack.push(Task::Visit(id));
                        stack.push(Task::NoteNonLinear(id));
                        let operands: Vec<ExprId> = Operands::new(&func.arena[id]).collect();
                        for child in operands.into_iter().rev() {
                            stack.push(Task::Scan(child));
                        }
                    }
                    _ => {
                        stack.push(Task::Visit(id));
                        push_child_scans(&func.arena, id, &mut stack);
                    }
                }
            }
            Task::Visit(id) => visitor.visit(func, id),
            Task::NoteNonLinear(id) => visitor.note_non_linear(func, id),
            Task::Post(_) => unreachable!(),
        }
    }
}

/// Read-only post-order walk over a subtree, for counters and analyzers
/// that never mutate.
pub fn walk_ref(arena: &ExprArena, root: ExprId, f: &mut impl FnMut(ExprId)) {
    enum RefTask {
        Scan(ExprId),
        Visit(ExprId),
    }
    let mut stack = vec![RefTask::Scan(root)];
    while let Some(task) = stack.pop() {
        match task {
            RefTask::Scan(id) => {
                stack.push(RefTask::Visit(id));
                match &arena[id].kind {
                    ExprKind::Block { list, .. } => {
                        for &child in list.iter().rev() {
                            stack.push(RefTask::Scan(child));
                        }
                    }
                    ExprKind::If {
                        condition,
                        if_true,
                        if_false,
                    } => {
                        if let Some(if_false) = if_false {
                            stack.push(RefTask::Scan(*if_false));
                        }
                        stack.push(RefTask::Scan(*if_true));
                        stack.push(RefTask::Scan(*condition));
                    }
                    ExprKind::Loop { body, .. } => stack.push(RefTask::Scan(*body)),
                    _ => {
                        let operands: Vec<ExprId> = Operands::new(&arena[id]).collect();
                        for child in operands.into_iter().rev() {
                            stack.push(RefTask::Scan(child));
                        }
                    }
                }
            }
            RefTask::Visit(id) => f(id),
        }
    }
}

/// Whether any break or switch in the subtree targets `name`.
pub fn has_break_targeting(arena: &ExprArena, root: ExprId, name: &str) -> bool {
    let mut found = false;
    walk_ref(arena, root, &mut |id| match &arena[id].kind {
        ExprKind::Break { name: target, .. } if target == name => found = true,
        ExprKind::Switch {
            targets, default, ..
        } => {
            if default == name || targets.iter().any(|t| t == name) {
                found = true;
            }
        }
        _ => {}
    });
    found
}
