//! Representación del árbol de steps (la IR que consume el ejecutor).
//!
//! El árbol es una variante etiquetada (`StepKind`), no una jerarquía
//! polimórfica: el ejecutor despacha con un match plano y agregar un kind
//! toca un solo sitio. Los subárboles de branching viven dentro de la
//! variante; la iteración construye su body por ítem con una factory.
//!
//! Invariante: el árbol es finito y acíclico por construcción (el builder
//! sólo compone secuencias hacia abajo).

use std::time::Duration;

use indexmap::IndexMap;

use super::callbacks::{CaseSelector, CompletionHook, ItemHook, ItemSource, MessageFactory, Predicate, ResultBinder,
                       TimeSelector};
use super::options::StepOptions;

/// Un nodo del flujo: kind + opciones + compensación opcional.
pub struct FlowStep<S> {
    pub kind: StepKind<S>,
    pub options: StepOptions<S>,
    /// Factory del mensaje compensatorio si este step debe deshacerse.
    pub compensation: Option<MessageFactory<S>>,
}

impl<S> FlowStep<S> {
    pub fn new(kind: StepKind<S>) -> Self {
        Self { kind,
               options: StepOptions::default(),
               compensation: None }
    }

    /// Nombre corto del kind, para logs y errores.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            StepKind::Send { .. } => "send",
            StepKind::Query { .. } => "query",
            StepKind::Publish { .. } => "publish",
            StepKind::If { .. } => "if",
            StepKind::Switch { .. } => "switch",
            StepKind::ForEach(_) => "for_each",
            StepKind::WhenAll { .. } => "when_all",
            StepKind::WhenAny { .. } => "when_any",
            StepKind::Delay { .. } => "delay",
            StepKind::ScheduleAt { .. } => "schedule_at",
        }
    }

    /// ¿El kind produce un resultado ligable con `into`?
    pub fn produces_result(&self) -> bool {
        matches!(self.kind,
                 StepKind::Send { .. } | StepKind::Query { .. } | StepKind::WhenAny { .. })
    }

    /// ¿El step suspende el flujo en vez de completarse en línea?
    pub fn is_wait(&self) -> bool {
        matches!(self.kind,
                 StepKind::WhenAll { .. } | StepKind::WhenAny { .. } | StepKind::Delay { .. }
                 | StepKind::ScheduleAt { .. })
    }
}

/// Una rama condicional de un `if` (then o else-if).
pub struct Branch<S> {
    pub condition: Predicate<S>,
    pub body: Vec<FlowStep<S>>,
}

/// Configuración completa de un `for_each`.
pub struct ForEachStep<S> {
    pub source: ItemSource<S>,
    /// Construye el body para un ítem concreto.
    pub body: super::SequenceFactory<S>,
    /// Bodies concurrentes como máximo. 1 = ejecución en línea.
    pub parallelism: usize,
    /// Ítems entre checkpoints de progreso en modo paralelo.
    pub batch_size: usize,
    /// Registrar el fallo y seguir con el resto de los ítems.
    pub continue_on_failure: bool,
    pub on_item_success: Option<ItemHook<S>>,
    pub on_complete: Option<CompletionHook<S>>,
}

pub enum StepKind<S> {
    /// Comando; con `into` presente el despacho espera resultado.
    Send {
        factory: MessageFactory<S>,
        into: Option<ResultBinder<S>>,
    },
    /// Query; el resultado se liga con `into` (o se descarta).
    Query {
        factory: MessageFactory<S>,
        into: Option<ResultBinder<S>>,
    },
    /// Evento fire-and-forget.
    Publish { factory: MessageFactory<S> },
    /// Rama 0 = then, 1.. = else-ifs, `else_branch` aparte. Sin rama que
    /// matchee y sin else, el step es un no-op.
    If {
        branches: Vec<Branch<S>>,
        else_branch: Option<Vec<FlowStep<S>>>,
    },
    /// Case map con orden de declaración y lookup O(1). Claves duplicadas:
    /// gana la primera, las siguientes se ignoran (decisión fijada acá y en
    /// el builder).
    Switch {
        selector: CaseSelector<S>,
        cases: IndexMap<String, Vec<FlowStep<S>>>,
        default: Option<Vec<FlowStep<S>>>,
    },
    ForEach(ForEachStep<S>),
    /// Fan-out de hijos; suspende hasta que todos señalen.
    WhenAll {
        children: Vec<MessageFactory<S>>,
        timeout: Option<Duration>,
        /// Compensación agregada despachada si algún hijo falla.
        compensation: Option<MessageFactory<S>>,
    },
    /// Fan-out de hijos; suspende hasta la primera señal.
    WhenAny {
        children: Vec<MessageFactory<S>>,
        timeout: Option<Duration>,
        into: Option<ResultBinder<S>>,
    },
    /// Timer relativo: reanuda cuando venza la duración.
    Delay { duration: Duration },
    /// Timer absoluto calculado del estado.
    ScheduleAt { at: TimeSelector<S> },
}
