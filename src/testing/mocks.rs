//! Test doubles for the Git host.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::drafts::PrStatus;
use crate::error::{utils, CommitStep, StaticmsError, StaticmsResult};
use crate::github::{
    BranchHead, CommitSummary, GitBranchRef, GitHost, GitUser, NewPullRequest, PullRequestInfo,
    RemoteFile, RepoRef, TreeEntry,
};

#[derive(Debug, Clone)]
struct StoredCommit {
    tree: String,
    parents: Vec<String>,
    message: String,
}

#[derive(Debug, Clone, Copy)]
struct FailureRule {
    /// Fail only the nth call (1-based); every call when `None`.
    nth: Option<usize>,
    status: u16,
}

#[derive(Debug, Default)]
struct HostState {
    refs: HashMap<String, String>,
    commits: HashMap<String, StoredCommit>,
    trees: HashMap<String, BTreeMap<String, String>>,
    blobs: HashMap<String, String>,
    pulls: Vec<PullRequestInfo>,
    next_id: u64,
    calls: HashMap<CommitStep, usize>,
    failures: HashMap<CommitStep, FailureRule>,
    race_branch: Option<String>,
    update_targets: Vec<String>,
}

impl HostState {
    fn next_sha(&mut self) -> String {
        self.next_id += 1;
        format!("{:040x}", self.next_id)
    }

    /// Count the call and apply any injected failure.
    fn enter(&mut self, step: CommitStep) -> StaticmsResult<()> {
        let count = self.calls.entry(step).or_insert(0);
        *count += 1;
        let count = *count;
        match self.failures.get(&step) {
            Some(rule) if rule.nth.map_or(true, |n| n == count) => Err(StaticmsError::upstream(
                step,
                Some(rule.status),
                format!("injected {} failure", step),
            )),
            _ => Ok(()),
        }
    }

    fn commit(&mut self, tree: String, parents: Vec<String>, message: &str) -> String {
        let sha = self.next_sha();
        self.commits.insert(
            sha.clone(),
            StoredCommit {
                tree,
                parents,
                message: message.to_string(),
            },
        );
        sha
    }

    fn files_of(&self, commit_sha: &str) -> BTreeMap<String, String> {
        self.commits
            .get(commit_sha)
            .and_then(|c| self.trees.get(&c.tree))
            .map(|tree| {
                tree.iter()
                    .map(|(path, blob)| (path.clone(), self.blobs.get(blob).cloned().unwrap_or_default()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// In-memory single-repository Git host.
///
/// Object shas are sequential hex counters. Every trait call is counted per
/// [`CommitStep`] and can be made to fail with [`InMemoryGitHost::fail_on`].
#[derive(Debug, Default)]
pub struct InMemoryGitHost {
    state: Mutex<HostState>,
}

impl InMemoryGitHost {
    /// Host with a `main` branch holding one empty commit.
    pub fn new() -> Self {
        Self::default().with_branch("main")
    }

    pub fn with_branch(self, branch: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let tree = state.next_sha();
            state.trees.insert(tree.clone(), BTreeMap::new());
            let sha = state.commit(tree, Vec::new(), "Initial commit");
            state.refs.insert(branch.to_string(), sha);
        }
        self
    }

    /// Commit a UTF-8 file directly onto `branch`.
    pub fn with_file(self, branch: &str, path: &str, content: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let parent = state.refs.get(branch).cloned().expect("branch must exist");
            let mut files = state
                .commits
                .get(&parent)
                .and_then(|c| state.trees.get(&c.tree))
                .cloned()
                .unwrap_or_default();
            let blob = state.next_sha();
            state.blobs.insert(blob.clone(), content.to_string());
            files.insert(path.to_string(), blob);
            let tree = state.next_sha();
            state.trees.insert(tree.clone(), files);
            let sha = state.commit(tree, vec![parent], &format!("Add {}", path));
            state.refs.insert(branch.to_string(), sha);
        }
        self
    }

    pub fn fail_on(&self, step: CommitStep, status: u16) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(step, FailureRule { nth: None, status });
    }

    pub fn fail_on_nth(&self, step: CommitStep, nth: usize, status: u16) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(step, FailureRule { nth: Some(nth), status });
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    /// Move `branch` to a foreign commit right before the next ref update.
    pub fn race_next_update(&self, branch: &str) {
        self.state.lock().unwrap().race_branch = Some(branch.to_string());
    }

    pub fn calls(&self, step: CommitStep) -> usize {
        self.state.lock().unwrap().calls.get(&step).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().unwrap().calls.values().sum()
    }

    /// Branches passed to successful ref updates, in order.
    pub fn update_targets(&self) -> Vec<String> {
        self.state.lock().unwrap().update_targets.clone()
    }

    pub fn head(&self, branch: &str) -> Option<String> {
        self.state.lock().unwrap().refs.get(branch).cloned()
    }

    /// Decoded files in the tree of `branch`'s head commit.
    pub fn files(&self, branch: &str) -> BTreeMap<String, String> {
        let state = self.state.lock().unwrap();
        state
            .refs
            .get(branch)
            .map(|sha| state.files_of(sha))
            .unwrap_or_default()
    }

    pub fn parents(&self, commit_sha: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .commits
            .get(commit_sha)
            .map(|c| c.parents.clone())
            .unwrap_or_default()
    }

    pub fn pulls(&self) -> Vec<PullRequestInfo> {
        self.state.lock().unwrap().pulls.clone()
    }

    pub fn set_pull_state(&self, number: u64, status: PrStatus) {
        let mut state = self.state.lock().unwrap();
        if let Some(pull) = state.pulls.iter_mut().find(|p| p.number == number) {
            pull.state = status;
        }
    }
}

#[async_trait]
impl GitHost for InMemoryGitHost {
    async fn get_branch(&self, _repo: &RepoRef, branch: &str) -> StaticmsResult<BranchHead> {
        let mut state = self.state.lock().unwrap();
        state.enter(CommitStep::ResolveBranch)?;
        let commit_sha = state
            .refs
            .get(branch)
            .cloned()
            .ok_or_else(|| utils::not_found_error("branch", branch))?;
        let tree_sha = state.commits[&commit_sha].tree.clone();
        Ok(BranchHead { commit_sha, tree_sha })
    }

    async fn create_ref(&self, _repo: &RepoRef, branch: &str, sha: &str) -> StaticmsResult<()> {
        let mut state = self.state.lock().unwrap();
        state.enter(CommitStep::CreateBranch)?;
        if state.refs.contains_key(branch) {
            return Err(StaticmsError::upstream(
                CommitStep::CreateBranch,
                Some(422),
                "Reference already exists",
            ));
        }
        state.refs.insert(branch.to_string(), sha.to_string());
        Ok(())
    }

    async fn create_blob(&self, _repo: &RepoRef, content: &str, encoding: &str) -> StaticmsResult<String> {
        let mut state = self.state.lock().unwrap();
        state.enter(CommitStep::CreateBlob)?;
        let decoded = if encoding == "base64" {
            let bytes = BASE64.decode(content).map_err(|e| {
                StaticmsError::upstream(CommitStep::CreateBlob, Some(422), e.to_string())
            })?;
            String::from_utf8_lossy(&bytes).into_owned()
        } else {
            content.to_string()
        };
        let sha = state.next_sha();
        state.blobs.insert(sha.clone(), decoded);
        Ok(sha)
    }

    async fn create_tree(
        &self,
        _repo: &RepoRef,
        base_tree: &str,
        entries: &[TreeEntry],
    ) -> StaticmsResult<String> {
        let mut state = self.state.lock().unwrap();
        state.enter(CommitStep::CreateTree)?;
        let mut files = state.trees.get(base_tree).cloned().ok_or_else(|| {
            StaticmsError::upstream(CommitStep::CreateTree, Some(422), "base_tree not found")
        })?;
        for entry in entries {
            files.insert(entry.path.clone(), entry.sha.clone());
        }
        let sha = state.next_sha();
        state.trees.insert(sha.clone(), files);
        Ok(sha)
    }

    async fn create_commit(
        &self,
        _repo: &RepoRef,
        message: &str,
        tree: &str,
        parents: &[String],
    ) -> StaticmsResult<String> {
        let mut state = self.state.lock().unwrap();
        state.enter(CommitStep::CreateCommit)?;
        if !state.trees.contains_key(tree) {
            return Err(StaticmsError::upstream(CommitStep::CreateCommit, Some(422), "tree not found"));
        }
        Ok(state.commit(tree.to_string(), parents.to_vec(), message))
    }

    async fn update_ref(
        &self,
        _repo: &RepoRef,
        branch: &str,
        expected_parent: &str,
        new_sha: &str,
    ) -> StaticmsResult<()> {
        let mut state = self.state.lock().unwrap();
        state.enter(CommitStep::UpdateRef)?;

        if state.race_branch.as_deref() == Some(branch) {
            state.race_branch = None;
            let parent = state.refs[branch].clone();
            let tree = state.commits[&parent].tree.clone();
            let foreign = state.commit(tree, vec![parent], "Concurrent change");
            state.refs.insert(branch.to_string(), foreign);
        }

        let actual = state
            .refs
            .get(branch)
            .cloned()
            .ok_or_else(|| utils::not_found_error("branch", branch))?;
        if actual != expected_parent {
            return Err(StaticmsError::RefConflict {
                branch: branch.to_string(),
                expected: expected_parent.to_string(),
                actual,
            });
        }
        state.refs.insert(branch.to_string(), new_sha.to_string());
        state.update_targets.push(branch.to_string());
        Ok(())
    }

    async fn delete_ref(&self, _repo: &RepoRef, branch: &str) -> StaticmsResult<()> {
        let mut state = self.state.lock().unwrap();
        state.enter(CommitStep::DeleteBranch)?;
        match state.refs.remove(branch) {
            Some(_) => Ok(()),
            None => Err(StaticmsError::upstream(
                CommitStep::DeleteBranch,
                Some(422),
                "Reference does not exist",
            )),
        }
    }

    async fn create_pull(&self, repo: &RepoRef, pull: &NewPullRequest) -> StaticmsResult<PullRequestInfo> {
        let mut state = self.state.lock().unwrap();
        state.enter(CommitStep::OpenPullRequest)?;
        if !state.refs.contains_key(&pull.head) {
            return Err(StaticmsError::upstream(
                CommitStep::OpenPullRequest,
                Some(422),
                "head branch does not exist",
            ));
        }
        let number = state.pulls.len() as u64 + 1;
        let info = PullRequestInfo {
            number,
            html_url: format!("https://github.com/{}/pull/{}", repo, number),
            state: PrStatus::Open,
            title: pull.title.clone(),
            body: pull.body.clone(),
            user: Some(GitUser { login: "editor".to_string() }),
            head: GitBranchRef { name: pull.head.clone() },
            base: GitBranchRef { name: pull.base.clone() },
        };
        state.pulls.push(info.clone());
        Ok(info)
    }

    async fn get_pull(&self, _repo: &RepoRef, number: u64) -> StaticmsResult<PullRequestInfo> {
        let mut state = self.state.lock().unwrap();
        state.enter(CommitStep::GetPullRequest)?;
        state
            .pulls
            .iter()
            .find(|p| p.number == number)
            .cloned()
            .ok_or_else(|| utils::not_found_error("pull request", &number.to_string()))
    }

    async fn compare(&self, _repo: &RepoRef, base: &str, head: &str) -> StaticmsResult<Vec<CommitSummary>> {
        let mut state = self.state.lock().unwrap();
        state.enter(CommitStep::Compare)?;
        let base_sha = state
            .refs
            .get(base)
            .cloned()
            .ok_or_else(|| utils::not_found_error("branch", base))?;
        let mut cursor = state
            .refs
            .get(head)
            .cloned()
            .ok_or_else(|| utils::not_found_error("branch", head))?;

        let mut commits = Vec::new();
        while cursor != base_sha {
            let Some(commit) = state.commits.get(&cursor) else { break };
            commits.push(CommitSummary {
                sha: cursor.clone(),
                message: commit.message.clone(),
                author: None,
                html_url: None,
            });
            match commit.parents.first() {
                Some(parent) => cursor = parent.clone(),
                None => break,
            }
        }
        commits.reverse();
        Ok(commits)
    }

    async fn get_contents(
        &self,
        _repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> StaticmsResult<Option<RemoteFile>> {
        let mut state = self.state.lock().unwrap();
        state.enter(CommitStep::FetchContents)?;
        let Some(head) = state.refs.get(git_ref) else {
            return Ok(None);
        };
        let blob = state
            .commits
            .get(head)
            .and_then(|c| state.trees.get(&c.tree))
            .and_then(|tree| tree.get(path));
        Ok(blob.map(|sha| RemoteFile {
            content: state.blobs.get(sha).cloned().unwrap_or_default(),
            sha: sha.clone(),
        }))
    }
}
