//! Aggregation of several regressors into one predictor.
//!
//! Members are shared [`ModelHandle`]s: a member fitted through the
//! aggregation is fitted for every other holder too. Each member remembers
//! whether it was already trained when attached (`init_trained`); only
//! members trained through the aggregation are saved with it.

mod function;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

pub use function::{mean, median, AggregationFunction, CustomAggregation};

use function::FunctionRecord;

use crate::backends::{check_regressor_options, no_probabilities, not_fitted, read_preprocess, read_record, write_pipelines};
use crate::data::{Batch, ClassSpace, Inputs, Predictions, Targets};
use crate::error::{ModelError, ModelResult};
use crate::model::{
    save_model, Model, ModelBase, ModelFamily, ModelHandle, ModelOptions, RefitPolicy, StandaloneArtifact,
    StandalonePaths,
};
use crate::preprocess::PreprocessPipeline;
use crate::registry::ModelRegistry;
use crate::store::{self, ArtifactKind, ArtifactStore, AGGREGATION_FUNCTION_FILE};

const SAVE_TOGETHER_WARNING: &str = "**Warning**: this model aggregates other models and only stores their names. \
     Save every member model as well and copy their directories together with this one, \
     otherwise it cannot be reloaded.";

// =============================================================================
// Specs
// =============================================================================

/// A member given at construction: a live handle or the name of a saved model.
#[derive(Debug, Clone)]
pub enum MemberSpec {
    Handle(ModelHandle),
    Name(String),
}

impl From<ModelHandle> for MemberSpec {
    fn from(handle: ModelHandle) -> Self {
        MemberSpec::Handle(handle)
    }
}

impl From<&str> for MemberSpec {
    fn from(name: &str) -> Self {
        MemberSpec::Name(name.to_string())
    }
}

impl From<String> for MemberSpec {
    fn from(name: String) -> Self {
        MemberSpec::Name(name)
    }
}

/// The combination rule given at construction.
#[derive(Debug, Clone)]
pub enum FunctionSpec {
    /// `median_predict`, `mean_predict` or a custom function registered in
    /// the [`ModelRegistry`].
    Named(String),
    Function(AggregationFunction),
}

impl From<&str> for FunctionSpec {
    fn from(name: &str) -> Self {
        FunctionSpec::Named(name.to_string())
    }
}

impl From<AggregationFunction> for FunctionSpec {
    fn from(function: AggregationFunction) -> Self {
        FunctionSpec::Function(function)
    }
}

impl From<CustomAggregation> for FunctionSpec {
    fn from(custom: CustomAggregation) -> Self {
        FunctionSpec::Function(AggregationFunction::Custom(custom))
    }
}

#[derive(Debug, Clone)]
pub struct Member {
    name: String,
    handle: ModelHandle,
    init_trained: bool,
}

impl Member {
    /// Directory name of the member, used to find it again on reload.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> &ModelHandle {
        &self.handle
    }

    pub fn init_trained(&self) -> bool {
        self.init_trained
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AggregationConfs {
    function: FunctionRecord,
    list_models_name: Vec<String>,
}

// =============================================================================
// ModelAggregationRegressor
// =============================================================================

#[derive(Debug)]
pub struct ModelAggregationRegressor {
    base: ModelBase,
    members: Vec<Member>,
    function: AggregationFunction,
    preprocess: Option<PreprocessPipeline>,
}

impl ModelAggregationRegressor {
    pub const MODEL_CLASS: &'static str = "ModelAggregationRegressor";

    /// Build from members and a combination rule.
    ///
    /// Named members are loaded through `registry`. Every member must be a
    /// regressor. When all members are already trained the aggregation
    /// starts trained, with `nb_fit = 1`.
    pub fn new(
        options: &ModelOptions,
        members: Vec<MemberSpec>,
        function: impl Into<FunctionSpec>,
        registry: &ModelRegistry,
    ) -> ModelResult<Self> {
        check_regressor_options(Self::MODEL_CLASS, options)?;
        if members.is_empty() {
            return Err(ModelError::config("an aggregation needs at least one member"));
        }
        let function = match function.into() {
            FunctionSpec::Named(name) => AggregationFunction::resolve(&name, registry)?,
            FunctionSpec::Function(function) => function,
        };
        let members = members
            .into_iter()
            .map(|spec| {
                let handle = match spec {
                    MemberSpec::Handle(handle) => handle,
                    MemberSpec::Name(name) => registry.load_model(&name)?,
                };
                attach(handle)
            })
            .collect::<ModelResult<Vec<_>>>()?;

        let mut model = Self {
            base: ModelBase::create(options, "model_aggregation_regressor")?,
            members,
            function,
            preprocess: None,
        };
        if model.members.iter().all(|m| m.init_trained) {
            model.sync_columns();
            model.base.mark_trained();
        }
        info!(
            model_name = %model.base.model_name(),
            n_members = model.members.len(),
            function = model.function.name(),
            trained = model.base.is_trained(),
            "aggregation created"
        );
        Ok(model)
    }

    /// Empty shell filled by [`Model::reload_from_standalone`].
    pub(crate) fn detached(options: &ModelOptions) -> ModelResult<Self> {
        Ok(Self {
            base: ModelBase::create(options, "model_aggregation_regressor")?,
            members: Vec::new(),
            function: AggregationFunction::Median,
            preprocess: None,
        })
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn function(&self) -> &AggregationFunction {
        &self.function
    }

    pub fn preprocess(&self) -> Option<&PreprocessPipeline> {
        self.preprocess.as_ref()
    }

    /// Columns required by the members, in first-seen order.
    fn sync_columns(&mut self) {
        let mut columns: Vec<String> = Vec::new();
        for member in &self.members {
            if let Some(x_col) = member.handle.read().base().x_col() {
                for column in x_col {
                    if !columns.contains(column) {
                        columns.push(column.clone());
                    }
                }
            }
        }
        if columns.is_empty() {
            if let Some(x_col) = self.base.x_col() {
                columns = x_col.to_vec();
            }
        }
        self.base.set_x_col((!columns.is_empty()).then(|| columns.clone()));
        self.preprocess = Some(PreprocessPipeline::passthrough(columns));
    }

    fn member_names(&self) -> Vec<String> {
        self.members.iter().map(|m| m.name.clone()).collect()
    }
}

fn attach(handle: ModelHandle) -> ModelResult<Member> {
    let (name, family, trained) = {
        let model = handle.read();
        let name = model
            .model_dir()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| model.model_name().to_string());
        (name, model.family(), model.is_trained())
    };
    if family != ModelFamily::Regressor {
        return Err(ModelError::config(format!(
            "aggregation members must be regressors, `{name}` is a {family}"
        )));
    }
    debug!(member = %name, init_trained = trained, "member attached");
    Ok(Member {
        name,
        handle,
        init_trained: trained,
    })
}

impl Model for ModelAggregationRegressor {
    fn base(&self) -> &ModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ModelBase {
        &mut self.base
    }

    fn model_class(&self) -> &'static str {
        Self::MODEL_CLASS
    }

    fn family(&self) -> ModelFamily {
        ModelFamily::Regressor
    }

    fn librairie(&self) -> &'static str {
        "gabarit"
    }

    fn refit_policy(&self) -> RefitPolicy {
        RefitPolicy::FitUntrained
    }

    /// Fit the members that are not trained yet; trained members are left
    /// untouched.
    fn fit_batch(&mut self, x: &Batch, y: &Targets) -> ModelResult<ClassSpace> {
        let mut fitted = 0;
        for member in &self.members {
            let mut model = member.handle.write();
            if model.is_trained() {
                debug!(member = %member.name, "member already trained, skipped");
                continue;
            }
            model.fit(Inputs::batch(x.clone()), y.clone())?;
            fitted += 1;
        }
        if fitted == 0 {
            info!(model_name = %self.base.model_name(), "every member already trained, nothing to fit");
        }
        self.sync_columns();
        Ok(ClassSpace::default())
    }

    fn predict_batch(&self, x: &Batch, return_proba: bool) -> ModelResult<Predictions> {
        if return_proba {
            return Err(no_probabilities(Self::MODEL_CLASS));
        }
        if let (Some(preprocess), Batch::Frame(frame)) = (&self.preprocess, x) {
            if let Some(missing) = preprocess.mandatory_columns().iter().find(|c| frame.column_index(c).is_none()) {
                return Err(ModelError::invalid_input(format!("missing column `{missing}`")));
            }
        }

        let mut stacked = Array2::zeros((x.len(), self.members.len()));
        for (j, member) in self.members.iter().enumerate() {
            let model = member.handle.read();
            if !model.is_trained() {
                return Err(not_fitted(model.base()));
            }
            match model.predict_batch(x, false)? {
                Predictions::Values(values) => stacked.column_mut(j).assign(&values),
                _ => {
                    return Err(ModelError::invalid_input(format!(
                        "member `{}` did not return regression values",
                        member.name
                    )))
                }
            }
        }
        Ok(Predictions::Values(self.function.apply(stacked.view())))
    }

    fn backend_confs(&self) -> ModelResult<Map<String, Value>> {
        let mut confs = Map::new();
        confs.insert("list_models_name".into(), serde_json::to_value(self.member_names())?);
        confs.insert("aggregation_function".into(), Value::from(self.function.name()));
        Ok(confs)
    }

    fn write_artifacts(&self, store: &ArtifactStore) -> ModelResult<()> {
        let confs = AggregationConfs {
            function: self.function.record(),
            list_models_name: self.member_names(),
        };
        write_pipelines(&self.base, store, confs, None::<&()>, self.preprocess.as_ref())?;
        if self.base.level_save().includes_pipelines() {
            store.write_blob(
                AGGREGATION_FUNCTION_FILE,
                ArtifactKind::AggregationFunction,
                &self.function.record(),
            )?;
        }
        Ok(())
    }

    fn usage_caveats(&self) -> Vec<String> {
        vec![SAVE_TOGETHER_WARNING.to_string()]
    }

    /// Save members trained through this aggregation, then the aggregation.
    fn save(&self, extra: Option<Map<String, Value>>) -> ModelResult<()> {
        for member in self.members.iter().filter(|m| !m.init_trained) {
            let model = member.handle.read();
            if model.is_trained() {
                debug!(member = %member.name, "saving member trained by the aggregation");
                model.save(None)?;
            }
        }
        save_model(self, extra)
    }

    fn reload_from_standalone(&mut self, paths: &StandalonePaths, registry: &ModelRegistry) -> ModelResult<()> {
        paths.require(&[
            StandaloneArtifact::Configuration,
            StandaloneArtifact::PreprocessPipeline,
            StandaloneArtifact::AggregationFunction,
        ])?;
        let stored = read_record(Self::MODEL_CLASS, paths)?;
        let preprocess = read_preprocess(paths)?;
        let record: FunctionRecord = store::read_blob(
            paths.path(StandaloneArtifact::AggregationFunction)?,
            ArtifactKind::AggregationFunction,
        )?;
        let function = AggregationFunction::from_record(record, registry)?;
        let names: Vec<String> = stored
            .extra_field("list_models_name")?
            .ok_or_else(|| ModelError::config("configuration has no list_models_name"))?;
        let members = names
            .iter()
            .map(|name| {
                let member = attach(registry.load_model(name)?)?;
                Ok(Member {
                    name: name.clone(),
                    init_trained: true,
                    ..member
                })
            })
            .collect::<ModelResult<Vec<_>>>()?;

        self.base.restore(&stored);
        self.members = members;
        self.function = function;
        self.preprocess = Some(preprocess);
        info!(
            model_name = %self.base.model_name(),
            n_members = self.members.len(),
            "aggregation reloaded"
        );
        Ok(())
    }
}
