//! 语句执行引擎。
//!
//! 每条语句执行后得到一个 [`Flow`]（正常、`break`、`continue`、`return`）或者一个异常。
//! 语句块依次执行其中的语句，遇到非正常流程或异常立即停止，然后：
//!
//! 1. 逆序运行已经登记的 `on block exit` 处理器（按策略过滤：无条件 / 仅成功 / 仅出错），
//!    处理器的异常收集到独立的通道中，全部运行完之后再与主结果合并
//! 2. 逆序释放块内声明的局部变量
//!
//! 出错时，原异常在处理器运行期间是"活动异常"，处理器可以用 `rethrow` 取出并重新抛出，
//! 此时重新抛出的异常取代原异常。

use log::trace;

use crate::{
    exception::{merge_outcome, names, ExceptionSink, OnyxException},
    runtime::{
        expression::{Expression, LValue},
        frame::Frame,
        scope::LocalId,
    },
    types::{list::OnyxList, value::OnyxValue},
};

/// How a statement finished.
#[derive(Debug)]
pub enum Flow {
    Normal,
    Break,
    Continue,
    Return(OnyxValue),
}

impl Flow {
    pub fn release(self) -> Result<(), OnyxException> {
        match self {
            Flow::Return(value) => value.release(),
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitPolicy {
    Unconditional,
    /// Runs only when the block is left without an exception.
    Success,
    /// Runs only when the block is left with an exception.
    Error,
}

pub enum ForeachSource {
    Value(Expression),
    /// The loop writes every element back into the referenced value.
    Reference(LValue),
}

pub struct ForeachStatement {
    pub target: LValue,
    pub source: ForeachSource,
    pub body: StatementBlock,
    pub reverse: bool,
}

pub enum Statement {
    Expression(Expression),
    Block(StatementBlock),
    If {
        condition: Expression,
        then: StatementBlock,
        otherwise: Option<StatementBlock>,
    },
    While {
        condition: Expression,
        body: StatementBlock,
    },
    DoWhile {
        body: StatementBlock,
        condition: Expression,
    },
    Foreach(Box<ForeachStatement>),
    OnBlockExit {
        policy: ExitPolicy,
        body: StatementBlock,
    },
    Return(Option<Expression>),
    Break,
    Continue,
    Throw {
        err: Expression,
        desc: Option<Expression>,
        arg: Option<Expression>,
    },
    Rethrow,
    Try {
        body: StatementBlock,
        /// Receives the exception as `{err, desc, arg, ...}`.
        catch_var: Option<LocalId>,
        handler: StatementBlock,
    },
    Delete(LValue),
}

/// Statements plus the local variables declared directly inside them.
pub struct StatementBlock {
    statements: Vec<Statement>,
    locals: Vec<LocalId>,
}

impl StatementBlock {
    pub fn new(statements: Vec<Statement>, locals: Vec<LocalId>) -> Self {
        StatementBlock { statements, locals }
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn locals(&self) -> &[LocalId] {
        &self.locals
    }

    pub fn exec(&self, frame: &mut Frame) -> Result<Flow, OnyxException> {
        let mut handlers: Vec<(ExitPolicy, &StatementBlock)> = Vec::new();
        let mut outcome = Ok(Flow::Normal);
        for statement in &self.statements {
            if let Statement::OnBlockExit { policy, body } = statement {
                handlers.push((*policy, body));
                continue;
            }
            match statement.exec(frame) {
                Ok(Flow::Normal) => {}
                other => {
                    outcome = other;
                    break;
                }
            }
        }

        let outcome = if handlers.is_empty() {
            outcome
        } else {
            run_exit_handlers(frame, &handlers, outcome)
        };

        let mut xsink = ExceptionSink::new();
        for id in self.locals.iter().rev() {
            xsink.absorb(frame.take_local(*id).release());
        }
        settle(outcome, xsink)
    }
}

fn run_exit_handlers(
    frame: &mut Frame,
    handlers: &[(ExitPolicy, &StatementBlock)],
    outcome: Result<Flow, OnyxException>,
) -> Result<Flow, OnyxException> {
    let failed = outcome.is_err();
    let flow = match outcome {
        Ok(flow) => Some(flow),
        Err(e) => {
            frame.push_active(e);
            None
        }
    };
    let mut xsink = ExceptionSink::new();
    for (policy, body) in handlers.iter().rev() {
        let run = match policy {
            ExitPolicy::Unconditional => true,
            ExitPolicy::Success => !failed,
            ExitPolicy::Error => failed,
        };
        if !run {
            continue;
        }
        trace!("running {:?} block exit handler", policy);
        match body.exec(frame) {
            Ok(handler_flow) => {
                xsink.absorb(handler_flow.release());
            }
            Err(e) => xsink.raise(e),
        }
    }
    match (failed.then(|| frame.pop_active()).flatten(), flow) {
        (Some(e), _) => merge_outcome(Err(e), xsink),
        (None, Some(flow)) => settle(Ok(flow), xsink),
        // rethrown by a handler; the rethrow is already in the sink
        (None, None) => xsink.into_result().map(|_| Flow::Normal),
    }
}

/// Merges `outcome` with collected exceptions; a pending return value is
/// released if the merge turns into an error.
fn settle(outcome: Result<Flow, OnyxException>, mut xsink: ExceptionSink) -> Result<Flow, OnyxException> {
    match outcome {
        Ok(flow) if xsink.is_set() => {
            xsink.absorb(flow.release());
            xsink.into_result().map(|_| Flow::Normal)
        }
        other => merge_outcome(other, xsink),
    }
}

fn release_value(value: OnyxValue) -> Result<Flow, OnyxException> {
    value.release().map(|_| Flow::Normal)
}

fn condition_holds(condition: &Expression, frame: &mut Frame) -> Result<bool, OnyxException> {
    let value = condition.eval(frame)?;
    let holds = value.to_bool();
    value.release()?;
    Ok(holds)
}

impl Statement {
    pub fn exec(&self, frame: &mut Frame) -> Result<Flow, OnyxException> {
        match self {
            Statement::Expression(expr) => release_value(expr.eval(frame)?),
            Statement::Block(block) => block.exec(frame),
            Statement::If {
                condition,
                then,
                otherwise,
            } => {
                if condition_holds(condition, frame)? {
                    then.exec(frame)
                } else if let Some(otherwise) = otherwise {
                    otherwise.exec(frame)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Statement::While { condition, body } => {
                while condition_holds(condition, frame)? {
                    match body.exec(frame)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Statement::DoWhile { body, condition } => {
                loop {
                    match body.exec(frame)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                    if !condition_holds(condition, frame)? {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }
            Statement::Foreach(foreach) => foreach.exec(frame),
            // registered by the enclosing block
            Statement::OnBlockExit { .. } => Ok(Flow::Normal),
            Statement::Return(value) => match value {
                Some(expr) => Ok(Flow::Return(expr.eval(frame)?)),
                None => Ok(Flow::Return(OnyxValue::Nothing)),
            },
            Statement::Break => Ok(Flow::Break),
            Statement::Continue => Ok(Flow::Continue),
            Statement::Throw { err, desc, arg } => Err(Self::build_exception(frame, err, desc, arg)?),
            Statement::Rethrow => match frame.take_active() {
                Some(e) => Err(e),
                None => Err(OnyxException::new(
                    names::RETHROW_ERROR,
                    "rethrow used outside of a catch block or error handler",
                )),
            },
            Statement::Try {
                body,
                catch_var,
                handler,
            } => match body.exec(frame) {
                Err(e) => {
                    trace!("caught {}", e.err());
                    if let Some(var) = catch_var {
                        let old = frame.replace_local(*var, OnyxValue::from(e.to_hash()));
                        old.release()?;
                    }
                    frame.push_active(e);
                    let outcome = handler.exec(frame);
                    frame.pop_active();
                    outcome
                }
                ok => ok,
            },
            Statement::Delete(lvalue) => lvalue.delete(frame).map(|_| Flow::Normal),
        }
    }

    fn build_exception(
        frame: &mut Frame,
        err: &Expression,
        desc: &Option<Expression>,
        arg: &Option<Expression>,
    ) -> Result<OnyxException, OnyxException> {
        let err_value = err.eval(frame)?;
        let err_name = err_value.to_string_value();
        err_value.release()?;
        let desc = match desc {
            Some(expr) => {
                let value = expr.eval(frame)?;
                let text = value.to_string_value();
                value.release()?;
                text
            }
            None => String::new(),
        };
        let arg = match arg {
            Some(expr) => expr.eval(frame)?,
            None => OnyxValue::Nothing,
        };
        Ok(OnyxException::new(err_name, desc).with_arg(arg))
    }

    pub fn foreach(target: LValue, source: Expression, body: StatementBlock) -> Statement {
        Statement::Foreach(Box::new(ForeachStatement {
            target,
            source: ForeachSource::Value(source),
            body,
            reverse: false,
        }))
    }

    pub fn foreach_ref(target: LValue, source: LValue, body: StatementBlock) -> Statement {
        Statement::Foreach(Box::new(ForeachStatement {
            target,
            source: ForeachSource::Reference(source),
            body,
            reverse: false,
        }))
    }
}

impl ForeachStatement {
    fn exec(&self, frame: &mut Frame) -> Result<Flow, OnyxException> {
        match &self.source {
            ForeachSource::Value(expr) => self.exec_values(expr, frame),
            ForeachSource::Reference(lvalue) => self.exec_reference(lvalue, frame),
        }
    }

    fn exec_values(&self, source: &Expression, frame: &mut Frame) -> Result<Flow, OnyxException> {
        let mut iter = source.functional_iterator(frame, "foreach", self.reverse)?;
        frame.push_implicit(Vec::new());
        let mut index = 0;
        let outcome = loop {
            let value = match iter.get_next() {
                Ok(Some(value)) => value,
                Ok(None) => break Ok(Flow::Normal),
                Err(e) => break Err(e),
            };
            if let Err(e) = frame
                .set_implicit(Vec::new(), index)
                .and_then(|_| self.target.assign(frame, value))
            {
                break Err(e);
            }
            index += 1;
            match self.body.exec(frame) {
                Ok(Flow::Normal | Flow::Continue) => {}
                Ok(Flow::Break) => break Ok(Flow::Normal),
                other => break other,
            }
        };
        let mut xsink = ExceptionSink::new();
        xsink.absorb(frame.pop_implicit());
        xsink.absorb(iter.release());
        settle(outcome, xsink)
    }

    /// Iterates a copy of the referenced list; after each pass the loop
    /// variable is written back to its element, and the whole list is stored
    /// back when the loop ends. Elements not reached are kept as they were.
    fn exec_reference(&self, source: &LValue, frame: &mut Frame) -> Result<Flow, OnyxException> {
        let (mut items, is_list) = match source.get(frame)? {
            OnyxValue::Nothing => return Ok(Flow::Normal),
            OnyxValue::List(list) => {
                let items: Vec<OnyxValue> = list.iter().cloned().collect();
                OnyxValue::List(list).release()?;
                (items, true)
            }
            other => (vec![other], false),
        };
        let order: Vec<usize> = if self.reverse {
            (0..items.len()).rev().collect()
        } else {
            (0..items.len()).collect()
        };

        let mut xsink = ExceptionSink::new();
        frame.push_implicit(Vec::new());
        let mut outcome = Ok(Flow::Normal);
        for i in order {
            if let Err(e) = frame
                .set_implicit(Vec::new(), i as i64)
                .and_then(|_| self.target.assign(frame, items[i].clone()))
            {
                outcome = Err(e);
                break;
            }
            let flow = self.body.exec(frame);
            match self.target.get(frame) {
                Ok(updated) => {
                    let old = std::mem::replace(&mut items[i], updated);
                    xsink.absorb(old.release());
                }
                Err(e) => xsink.raise(e),
            }
            match flow {
                Ok(Flow::Normal | Flow::Continue) => {}
                Ok(Flow::Break) => break,
                other => {
                    outcome = other;
                    break;
                }
            }
        }
        xsink.absorb(frame.pop_implicit());

        let written = if is_list {
            OnyxValue::from(OnyxList::from(items))
        } else {
            items.pop().unwrap_or_default()
        };
        xsink.absorb(source.assign(frame, written));
        settle(outcome, xsink)
    }
}
