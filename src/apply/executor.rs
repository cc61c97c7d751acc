//! Plan execution against the NSX manager.
//!
//! Replays a plan document's writes (or their recorded inverses) in
//! mode order: groups, then tag bulk operations, then segments. Tag
//! operations are paginated; a dry run logs every call without sending
//! anything.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use clap::ValueEnum;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, RulesError};
use crate::nsx::{NsxClient, Tag};
use crate::planner::{MemberType, Plan, ResourceIdList, TagBulkOp, TagRemoveOp};

/// Maximum resource ids per tag-operation request.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Tag bulk-operation collection endpoint.
const TAG_OPS_API: &str = "/policy/api/v1/infra/tags/tag-operations";

/// Which plan collections a run touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ApplyMode {
    /// Group writes only.
    Group,
    /// VM tag operations only.
    Vm,
    /// Segment updates only.
    Segment,
    /// Groups, then tag operations, then segments.
    All,
}

impl ApplyMode {
    const fn covers_groups(self) -> bool {
        matches!(self, Self::Group | Self::All)
    }

    const fn covers_vms(self) -> bool {
        matches!(self, Self::Vm | Self::All)
    }

    const fn covers_segments(self) -> bool {
        matches!(self, Self::Segment | Self::All)
    }
}

/// Allow-list restricting a removal run.
///
/// Holds target display names from the filter file, plus the external
/// ids of live VMs carrying those names once resolved. With no filter
/// the whole plan is eligible.
#[derive(Debug, Default)]
pub struct RemoveFilter {
    names: HashSet<String>,
    vm_ids: HashSet<String>,
}

impl RemoveFilter {
    /// Loads eligible target names from the first column of a CSV file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or cannot be parsed.
    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RulesError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .map_err(|e| RulesError::parse(e.to_string()))?;

        let mut names = HashSet::new();
        for record in reader.records() {
            let record = record.map_err(|e| RulesError::parse(e.to_string()))?;
            if let Some(name) = record.get(0) {
                let name = name.trim();
                if !name.is_empty() {
                    names.insert(name.to_string());
                }
            }
        }

        info!("Loaded {} filter entries from {}", names.len(), path.display());
        Ok(Self {
            names,
            vm_ids: HashSet::new(),
        })
    }

    /// Resolves the filter names to the external ids of live VMs.
    ///
    /// # Errors
    ///
    /// Returns an error if the VM listing fails.
    pub async fn resolve_vm_ids(&mut self, client: &NsxClient) -> Result<()> {
        let vms = client.list_virtual_machines().await?;
        self.vm_ids = vms
            .into_iter()
            .filter(|vm| self.names.contains(&vm.display_name))
            .map(|vm| vm.external_id)
            .collect();

        info!("Filter covers {} live VMs", self.vm_ids.len());
        Ok(())
    }

    fn allows_name(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    fn allows_vm_id(&self, id: &str) -> bool {
        self.vm_ids.contains(id)
    }
}

/// Totals of one apply or remove run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ApplySummary {
    /// Groups written or deleted.
    pub groups: usize,
    /// Segments written or restored.
    pub segments: usize,
    /// Tag-operation pages sent.
    pub tag_op_pages: usize,
    /// Whether this was a dry run.
    pub dry_run: bool,
}

impl ApplySummary {
    const fn new(dry_run: bool) -> Self {
        Self {
            groups: 0,
            segments: 0,
            tag_op_pages: 0,
            dry_run,
        }
    }
}

impl fmt::Display for ApplySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.dry_run { "Would write" } else { "Wrote" };
        write!(
            f,
            "{verb} {} groups, {} segment updates, {} tag-op pages",
            self.groups, self.segments, self.tag_op_pages
        )
    }
}

/// Executes or reverses a plan against the manager.
#[derive(Debug)]
pub struct ApplyExecutor<'a> {
    client: &'a NsxClient,
    page_size: usize,
    dry_run: bool,
}

impl<'a> ApplyExecutor<'a> {
    /// Creates an executor with the default page size.
    #[must_use]
    pub const fn new(client: &'a NsxClient) -> Self {
        Self {
            client,
            page_size: DEFAULT_PAGE_SIZE,
            dry_run: false,
        }
    }

    /// Sets the tag-operation page size.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Enables dry-run mode: log every call, send nothing.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Applies the plan's writes for the selected mode.
    ///
    /// # Errors
    ///
    /// Returns an error on the first failed API call.
    pub async fn apply(&self, plan: &Plan, mode: ApplyMode) -> Result<ApplySummary> {
        let mut summary = ApplySummary::new(self.dry_run);

        if mode.covers_groups() {
            for group in &plan.groups {
                self.write(&group.url, &group.payload, &format!("group '{}'", group.display_name()))
                    .await?;
                summary.groups += 1;
            }
        }

        if mode.covers_vms() {
            for scope in &plan.scopes {
                for op in &scope.tags {
                    summary.tag_op_pages += self
                        .put_apply_pages(&op.tag, op.resource_ids().to_vec())
                        .await?;
                }
            }
        }

        if mode.covers_segments() {
            for update in &plan.segments {
                self.write(
                    &update.url,
                    &update.payload,
                    &format!("segment '{}'", update.display_name()),
                )
                .await?;
                summary.segments += 1;
            }
        }

        info!("{summary}");
        Ok(summary)
    }

    /// Reverses the plan's writes for the selected mode.
    ///
    /// Groups are deleted, segments are patched back to their recorded
    /// tags, and the mirrored remove descriptors are replayed. An
    /// optional filter restricts which targets are touched.
    ///
    /// # Errors
    ///
    /// Returns an error on the first failed API call.
    pub async fn remove(
        &self,
        plan: &Plan,
        mode: ApplyMode,
        filter: Option<&RemoveFilter>,
    ) -> Result<ApplySummary> {
        let mut summary = ApplySummary::new(self.dry_run);

        if mode.covers_groups() {
            for group in &plan.groups {
                let eligible = filter.is_none_or(|f| f.allows_name(group.display_name()));
                if !eligible {
                    debug!("Group '{}' not in filter, keeping", group.display_name());
                    continue;
                }
                if self.dry_run {
                    info!("[dry-run] DELETE {} (group '{}')", group.url, group.display_name());
                } else {
                    info!("Deleting group '{}'", group.display_name());
                    self.client.delete(&group.url).await?;
                }
                summary.groups += 1;
            }
        }

        if mode.covers_vms() {
            for scope in &plan.scopes {
                for op in &scope.tagsremove {
                    let ids = match filter {
                        Some(f) => op
                            .resource_ids()
                            .iter()
                            .filter(|id| f.allows_vm_id(id))
                            .cloned()
                            .collect(),
                        None => op.resource_ids().to_vec(),
                    };
                    summary.tag_op_pages += self.put_remove_pages(&op.tag, ids).await?;
                }
            }
        }

        if mode.covers_segments() {
            for update in &plan.segments {
                let eligible = filter.is_none_or(|f| f.allows_name(update.display_name()));
                if !eligible {
                    debug!("Segment '{}' not in filter, keeping", update.display_name());
                    continue;
                }
                let mut restored = update.payload.clone();
                restored.tags = update.original_tags.clone();
                self.write(
                    &update.url,
                    &restored,
                    &format!("segment '{}' (restoring tags)", update.display_name()),
                )
                .await?;
                summary.segments += 1;
            }
        }

        info!("{summary}");
        Ok(summary)
    }

    /// Sends one PATCH, or logs it in dry-run mode.
    async fn write<B: Serialize>(&self, url: &str, payload: &B, what: &str) -> Result<()> {
        if self.dry_run {
            info!("[dry-run] PATCH {url} ({what})");
            return Ok(());
        }

        info!("Writing {what}");
        self.client.patch(url, payload).await
    }

    /// Pages one apply op's ids into tag-operation PUTs.
    async fn put_apply_pages(&self, tag: &Tag, ids: Vec<String>) -> Result<usize> {
        let mut pages = 0;
        for chunk in ids.chunks(self.page_size) {
            let page = TagBulkOp {
                tag: tag.clone(),
                apply_to: vec![Self::page_list(chunk)],
            };
            self.put_op_page(&page, chunk.len(), tag).await?;
            pages += 1;
        }
        Ok(pages)
    }

    /// Pages one remove op's ids into tag-operation PUTs.
    async fn put_remove_pages(&self, tag: &Tag, ids: Vec<String>) -> Result<usize> {
        let mut pages = 0;
        for chunk in ids.chunks(self.page_size) {
            let page = TagRemoveOp {
                tag: tag.clone(),
                remove_from: vec![Self::page_list(chunk)],
            };
            self.put_op_page(&page, chunk.len(), tag).await?;
            pages += 1;
        }
        Ok(pages)
    }

    /// Sends one tag-operation page under a fresh operation id.
    async fn put_op_page<B: Serialize>(&self, page: &B, ids: usize, tag: &Tag) -> Result<()> {
        let api = format!("{TAG_OPS_API}/vm_tag_op_{}", Uuid::new_v4());
        if self.dry_run {
            info!("[dry-run] PUT {api} ({ids} ids, tag {tag})");
            return Ok(());
        }

        debug!("PUT {api} ({ids} ids, tag {tag})");
        self.client.put(&api, page).await
    }

    fn page_list(ids: &[String]) -> ResourceIdList {
        ResourceIdList {
            resource_type: MemberType::VirtualMachine,
            resource_ids: ids.to_vec(),
        }
    }
}
