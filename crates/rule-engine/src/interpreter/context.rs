//! 평가 컨텍스트 -- 한 번의 규칙 평가 동안 유지되는 스크래치 상태

use std::collections::HashMap;

use pipewright_core::message::Message;
use pipewright_core::value::{MessageHandle, Value};

use crate::ast::Span;
use crate::functions::FunctionError;

/// 위치가 붙은 실행 시점 에러
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    /// 함수가 에러를 반환함
    #[error("In call to function '{function}' at {span} an exception was thrown: {source}")]
    Function {
        function: String,
        span: Span,
        source: FunctionError,
    },

    /// 연산/타입 에러
    #[error("Error evaluating expression at {span}: {reason}")]
    Expression { span: Span, reason: String },
}

impl EvalError {
    pub fn expression(span: Span, reason: impl Into<String>) -> Self {
        Self::Expression {
            span,
            reason: reason.into(),
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::Function { span, .. } | Self::Expression { span, .. } => *span,
        }
    }
}

/// 메시지 한 건, 규칙 한 번의 평가 범위
///
/// 변수 바인딩과 평가 중 생성된 메시지를 보관합니다. 처리 에러는 메시지에 직접 누적됩니다.
/// 평가가 끝나면 생성된 메시지는 인터프리터가 처리 큐로 옮깁니다.
pub struct EvaluationContext<'m> {
    message: &'m mut Message,
    created: Vec<Message>,
    vars: HashMap<String, Value>,
}

impl<'m> EvaluationContext<'m> {
    pub fn new(message: &'m mut Message) -> Self {
        Self {
            message,
            created: Vec::new(),
            vars: HashMap::new(),
        }
    }

    pub fn message(&self) -> &Message {
        &*self.message
    }

    pub fn message_mut(&mut self) -> &mut Message {
        &mut *self.message
    }

    /// 핸들이 가리키는 메시지
    pub fn resolve(&self, handle: MessageHandle) -> Option<&Message> {
        match handle {
            MessageHandle::Current => Some(&*self.message),
            MessageHandle::Created(index) => self.created.get(index),
        }
    }

    pub fn resolve_mut(&mut self, handle: MessageHandle) -> Option<&mut Message> {
        match handle {
            MessageHandle::Current => Some(&mut *self.message),
            MessageHandle::Created(index) => self.created.get_mut(index),
        }
    }

    /// 새로 만든 메시지를 등록하고 핸들을 반환합니다.
    pub fn add_created_message(&mut self, message: Message) -> MessageHandle {
        self.created.push(message);
        MessageHandle::Created(self.created.len() - 1)
    }

    pub fn created_messages(&self) -> &[Message] {
        &self.created
    }

    pub fn take_created_messages(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.created)
    }

    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// 규칙 하나의 평가가 끝나면 변수를 비웁니다.
    pub fn clear_variables(&mut self) {
        self.vars.clear();
    }

}
