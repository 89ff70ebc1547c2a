//! Recovery plans
//!
//! A plan is an ordered list of steps for one disaster type. The declared
//! order must already be a topological order of the dependency graph; the
//! executor never reorders, it only gates on unmet dependencies. Plans are
//! validated once when the registry is built and are immutable afterwards.

use crate::types::DisasterType;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

pub mod catalog;

pub use catalog::{standard_plans, CatalogProviders};

/// Result reported by a step or rollback procedure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub success: bool,
    pub message: String,
}

impl StepOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Executable body of a recovery step. Manual steps block inside `run`
/// until an operator has acted.
#[async_trait]
pub trait StepProcedure: Send + Sync {
    async fn run(&self) -> Result<StepOutcome>;
}

struct FnProcedure<F>(F);

#[async_trait]
impl<F, Fut> StepProcedure for FnProcedure<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StepOutcome>> + Send + 'static,
{
    async fn run(&self) -> Result<StepOutcome> {
        (self.0)().await
    }
}

/// Wrap an async closure as a step procedure
pub fn procedure<F, Fut>(f: F) -> Arc<dyn StepProcedure>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StepOutcome>> + Send + 'static,
{
    Arc::new(FnProcedure(f))
}

/// Immutable step definition, owned by exactly one plan
#[derive(Clone)]
pub struct RecoveryStep {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Informational; manual steps run through the same procedure contract
    pub automated: bool,
    pub estimated_duration_minutes: u32,
    pub dependencies: Vec<String>,
    pub procedure: Arc<dyn StepProcedure>,
    pub rollback: Option<Arc<dyn StepProcedure>>,
}

impl RecoveryStep {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        procedure: Arc<dyn StepProcedure>,
    ) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            description: name.clone(),
            name,
            automated: true,
            estimated_duration_minutes: 0,
            dependencies: Vec::new(),
            procedure,
            rollback: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn manual(mut self) -> Self {
        self.automated = false;
        self
    }

    pub fn estimated_minutes(mut self, minutes: u32) -> Self {
        self.estimated_duration_minutes = minutes;
        self
    }

    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dep in dependencies {
            let dep = dep.into();
            if !self.dependencies.contains(&dep) {
                self.dependencies.push(dep);
            }
        }
        self
    }

    pub fn with_rollback(mut self, rollback: Arc<dyn StepProcedure>) -> Self {
        self.rollback = Some(rollback);
        self
    }

    pub fn has_rollback(&self) -> bool {
        self.rollback.is_some()
    }
}

impl fmt::Debug for RecoveryStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryStep")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("automated", &self.automated)
            .field("estimated_duration_minutes", &self.estimated_duration_minutes)
            .field("dependencies", &self.dependencies)
            .field("has_rollback", &self.rollback.is_some())
            .finish()
    }
}

/// Ordered set of steps answering one disaster type
#[derive(Debug, Clone)]
pub struct RecoveryPlan {
    pub id: String,
    pub disaster_type: DisasterType,
    /// Lower is more urgent. Informational.
    pub priority: u8,
    pub steps: Vec<RecoveryStep>,
    pub required_personnel: Vec<String>,
}

impl RecoveryPlan {
    pub fn new(id: impl Into<String>, disaster_type: DisasterType, priority: u8) -> Self {
        Self {
            id: id.into(),
            disaster_type,
            priority,
            steps: Vec::new(),
            required_personnel: Vec::new(),
        }
    }

    pub fn step(mut self, step: RecoveryStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn personnel<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_personnel.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Sum of step estimates
    pub fn total_estimated_minutes(&self) -> u32 {
        self.steps.iter().map(|s| s.estimated_duration_minutes).sum()
    }

    pub fn get_step(&self, step_id: &str) -> Option<&RecoveryStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn step_ids(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.id.clone()).collect()
    }

    /// Structural validation: unique ids, known dependencies, no cycles,
    /// and a declared order that respects every dependency.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(Error::InvalidPlan(format!("plan {} has no steps", self.id)));
        }

        let mut positions: HashMap<&str, usize> = HashMap::with_capacity(self.steps.len());
        for (idx, step) in self.steps.iter().enumerate() {
            if positions.insert(step.id.as_str(), idx).is_some() {
                return Err(Error::InvalidPlan(format!(
                    "plan {} declares step {} more than once",
                    self.id, step.id
                )));
            }
        }

        for step in &self.steps {
            for dep in &step.dependencies {
                if !positions.contains_key(dep.as_str()) {
                    return Err(Error::InvalidPlan(format!(
                        "step {} in plan {} depends on unknown step {}",
                        step.id, self.id, dep
                    )));
                }
            }
        }

        self.topological_order()?;

        for (idx, step) in self.steps.iter().enumerate() {
            for dep in &step.dependencies {
                if positions[dep.as_str()] > idx {
                    return Err(Error::InvalidPlan(format!(
                        "step {} in plan {} is declared before its dependency {}",
                        step.id, self.id, dep
                    )));
                }
            }
        }

        Ok(())
    }

    /// Kahn's algorithm over the dependency graph. Ties are broken by
    /// declared position, so a valid plan yields its own declared order.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let index: HashMap<&str, usize> = self
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.as_str(), i))
            .collect();

        let mut in_degree = vec![0usize; self.steps.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.steps.len()];
        for (i, step) in self.steps.iter().enumerate() {
            let unique: HashSet<&str> = step.dependencies.iter().map(String::as_str).collect();
            for dep in unique {
                let Some(&d) = index.get(dep) else {
                    return Err(Error::InvalidPlan(format!(
                        "step {} in plan {} depends on unknown step {}",
                        step.id, self.id, dep
                    )));
                };
                in_degree[i] += 1;
                dependents[d].push(i);
            }
        }

        let mut ready: VecDeque<usize> = (0..self.steps.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.steps.len());

        while let Some(i) = ready.pop_front() {
            order.push(i);
            let mut released: Vec<usize> = Vec::new();
            for &next in &dependents[i] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    released.push(next);
                }
            }
            released.sort_unstable();
            for next in released {
                let pos = ready.iter().position(|&r| r > next).unwrap_or(ready.len());
                ready.insert(pos, next);
            }
        }

        if order.len() != self.steps.len() {
            let stuck: Vec<&str> = (0..self.steps.len())
                .filter(|i| in_degree[*i] > 0)
                .map(|i| self.steps[i].id.as_str())
                .collect();
            return Err(Error::InvalidPlan(format!(
                "plan {} has a dependency cycle among {:?}",
                self.id, stuck
            )));
        }

        Ok(order.into_iter().map(|i| self.steps[i].id.clone()).collect())
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            id: self.id.clone(),
            disaster_type: self.disaster_type,
            priority: self.priority,
            total_estimated_minutes: self.total_estimated_minutes(),
            required_personnel: self.required_personnel.clone(),
            steps: self
                .steps
                .iter()
                .map(|s| StepSummary {
                    id: s.id.clone(),
                    name: s.name.clone(),
                    description: s.description.clone(),
                    automated: s.automated,
                    estimated_duration_minutes: s.estimated_duration_minutes,
                    dependencies: s.dependencies.clone(),
                    has_rollback: s.rollback.is_some(),
                })
                .collect(),
        }
    }
}

/// Serializable view of a plan for reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub id: String,
    pub disaster_type: DisasterType,
    pub priority: u8,
    pub total_estimated_minutes: u32,
    pub required_personnel: Vec<String>,
    pub steps: Vec<StepSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub automated: bool,
    pub estimated_duration_minutes: u32,
    pub dependencies: Vec<String>,
    pub has_rollback: bool,
}

/// Disaster type to plan mapping. Read-only after construction.
#[derive(Debug, Clone, Default)]
pub struct PlanRegistry {
    plans: BTreeMap<DisasterType, Arc<RecoveryPlan>>,
}

impl PlanRegistry {
    /// Validate and register plans; any structural defect fails the build.
    pub fn new(plans: impl IntoIterator<Item = RecoveryPlan>) -> Result<Self> {
        let mut registered = BTreeMap::new();
        let mut plan_ids = HashSet::new();
        for plan in plans {
            plan.validate()?;
            if !plan_ids.insert(plan.id.clone()) {
                return Err(Error::InvalidPlan(format!(
                    "plan id {} registered more than once",
                    plan.id
                )));
            }
            let disaster_type = plan.disaster_type;
            if registered.insert(disaster_type, Arc::new(plan)).is_some() {
                return Err(Error::InvalidPlan(format!(
                    "more than one plan registered for {}",
                    disaster_type
                )));
            }
        }
        Ok(Self { plans: registered })
    }

    pub fn get_plan(&self, disaster_type: DisasterType) -> Result<Arc<RecoveryPlan>> {
        self.plans
            .get(&disaster_type)
            .cloned()
            .ok_or(Error::PlanNotFound(disaster_type))
    }

    pub fn contains(&self, disaster_type: DisasterType) -> bool {
        self.plans.contains_key(&disaster_type)
    }

    /// Plans ordered by priority, then disaster type
    pub fn plans(&self) -> Vec<Arc<RecoveryPlan>> {
        let mut plans: Vec<Arc<RecoveryPlan>> = self.plans.values().cloned().collect();
        plans.sort_by_key(|p| (p.priority, p.disaster_type));
        plans
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}
