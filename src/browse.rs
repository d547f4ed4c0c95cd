//! Catalog browsing: filter state, paging, favorites and matching.

use crate::api::types::{
    Dog, DogSearchParams, Location, LocationSearchParams, SortDirection, SortField,
};
use crate::api::{ApiError, CatalogGateway};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

static ZIP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{5}$").expect("valid zip regex"));

#[derive(Debug, Error)]
pub enum BrowseError {
    #[error("Pick at least one favorite first")]
    NoFavorites,

    #[error("The server did not return a matching dog")]
    EmptyMatch,

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Current search filters. Changing any filter returns to page 1.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchFilters {
    breeds: Vec<String>,
    zip_codes: Vec<String>,
    age_min: u32,
    age_max: u32,
    max_age: u32,
    sort_field: SortField,
    sort_dir: SortDirection,
    page: u32,
}

impl SearchFilters {
    pub fn new(max_age: u32) -> Self {
        Self {
            breeds: Vec::new(),
            zip_codes: Vec::new(),
            age_min: 0,
            age_max: max_age,
            max_age,
            sort_field: SortField::Breed,
            sort_dir: SortDirection::Asc,
            page: 1,
        }
    }

    pub fn breeds(&self) -> &[String] {
        &self.breeds
    }

    pub fn zip_codes(&self) -> &[String] {
        &self.zip_codes
    }

    pub fn age_range(&self) -> (u32, u32) {
        (self.age_min, self.age_max)
    }

    pub fn sort(&self) -> (SortField, SortDirection) {
        (self.sort_field, self.sort_dir)
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    /// Returns false if the breed was already selected
    pub fn add_breed(&mut self, breed: &str) -> bool {
        if self.breeds.iter().any(|b| b == breed) {
            return false;
        }
        self.breeds.push(breed.to_string());
        self.page = 1;
        true
    }

    pub fn remove_breed(&mut self, breed: &str) -> bool {
        let before = self.breeds.len();
        self.breeds.retain(|b| b != breed);
        let removed = self.breeds.len() != before;
        if removed {
            self.page = 1;
        }
        removed
    }

    pub fn clear_breeds(&mut self) {
        self.breeds.clear();
        self.page = 1;
    }

    /// Set zip codes from comma-separated input
    pub fn set_zip_input(&mut self, input: &str) {
        self.zip_codes = input
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        self.page = 1;
    }

    pub fn set_age_range(&mut self, min: u32, max: u32) -> Result<(), BrowseError> {
        if min > max {
            return Err(BrowseError::InvalidFilter(format!(
                "minimum age {} is above maximum {}",
                min, max
            )));
        }
        self.age_min = min.min(self.max_age);
        self.age_max = max.min(self.max_age);
        self.page = 1;
        Ok(())
    }

    pub fn set_sort(&mut self, field: SortField, dir: SortDirection) {
        self.sort_field = field;
        self.sort_dir = dir;
        self.page = 1;
    }

    /// Jump to `page`, clamped to `1..=page_count`
    pub fn set_page(&mut self, page: u32, page_count: u32) {
        self.page = page.clamp(1, page_count.max(1));
    }

    /// Zip filter is only applied once the first entry looks like a full zip
    fn effective_zip_codes(&self) -> Vec<String> {
        match self.zip_codes.first() {
            Some(first) if ZIP_RE.is_match(first) => self.zip_codes.clone(),
            _ => Vec::new(),
        }
    }

    pub fn to_params(&self, page_size: u32) -> DogSearchParams {
        DogSearchParams {
            breeds: self.breeds.clone(),
            zip_codes: self.effective_zip_codes(),
            age_min: Some(self.age_min),
            age_max: Some(self.age_max),
            size: Some(page_size),
            from: Some((self.page - 1) * page_size),
            sort: Some(self.sort_field),
            sort_direction: Some(self.sort_dir),
        }
    }
}

pub fn page_count(total: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size as u64).min(u32::MAX as u64) as u32
}

/// Favorite dog ids in the order they were added
#[derive(Debug, Clone, Default)]
pub struct Favorites {
    ids: Vec<String>,
}

impl Favorites {
    /// Add or remove `id`. Returns true if it is now a favorite.
    pub fn toggle(&mut self, id: &str) -> bool {
        if let Some(pos) = self.ids.iter().position(|f| f == id) {
            self.ids.remove(pos);
            false
        } else {
            self.ids.push(id.to_string());
            true
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|f| f == id)
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

/// The page of dogs currently on screen
#[derive(Debug, Clone, Default)]
pub struct ResultsPage {
    pub dogs: Vec<Dog>,
    pub total: u64,
    pub locations: HashMap<String, Location>,
}

pub struct Browser<C: CatalogGateway> {
    catalog: C,
    page_size: u32,
    pub filters: SearchFilters,
    pub favorites: Favorites,
    results: ResultsPage,
    breeds: Option<Vec<String>>,
}

impl<C: CatalogGateway> Browser<C> {
    pub fn new(catalog: C, page_size: u32, max_age: u32) -> Self {
        Self {
            catalog,
            page_size,
            filters: SearchFilters::new(max_age),
            favorites: Favorites::default(),
            results: ResultsPage::default(),
            breeds: None,
        }
    }

    pub fn results(&self) -> &ResultsPage {
        &self.results
    }

    pub fn page_count(&self) -> u32 {
        page_count(self.results.total, self.page_size)
    }

    /// Breed names, fetched once
    pub fn breeds(&mut self) -> Result<&[String], BrowseError> {
        if self.breeds.is_none() {
            self.breeds = Some(self.catalog.breeds()?);
        }
        Ok(self.breeds.as_deref().unwrap_or_default())
    }

    /// Run the search for the current filters and load the page's details
    pub fn refresh(&mut self) -> Result<&ResultsPage, BrowseError> {
        let params = self.filters.to_params(self.page_size);
        let found = self.catalog.search_dogs(&params)?;
        let dogs = if found.result_ids.is_empty() {
            Vec::new()
        } else {
            self.catalog.dogs_by_ids(&found.result_ids)?
        };
        tracing::debug!(total = found.total, fetched = dogs.len(), "search done");

        let locations = self.resolve_locations(&dogs);
        self.results = ResultsPage {
            dogs,
            total: found.total,
            locations,
        };
        Ok(&self.results)
    }

    fn resolve_locations(&self, dogs: &[Dog]) -> HashMap<String, Location> {
        let zips: BTreeSet<&str> = dogs.iter().map(|d| d.zip_code.as_str()).collect();
        if zips.is_empty() {
            return HashMap::new();
        }
        let zips: Vec<String> = zips.into_iter().map(|z| z.to_string()).collect();
        match self.catalog.locations_by_zip(&zips) {
            Ok(locations) => locations
                .into_iter()
                .map(|loc| (loc.zip_code.clone(), loc))
                .collect(),
            Err(e) => {
                tracing::warn!("location lookup failed: {}", e);
                HashMap::new()
            }
        }
    }

    pub fn next_page(&mut self) -> bool {
        let before = self.filters.page();
        self.filters.set_page(before + 1, self.page_count());
        self.filters.page() != before
    }

    pub fn prev_page(&mut self) -> bool {
        let before = self.filters.page();
        self.filters.set_page(before.saturating_sub(1), self.page_count());
        self.filters.page() != before
    }

    pub fn go_to_page(&mut self, page: u32) {
        let count = self.page_count();
        self.filters.set_page(page, count);
    }

    pub fn favorite_dogs(&self) -> Result<Vec<Dog>, BrowseError> {
        if self.favorites.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.catalog.dogs_by_ids(self.favorites.ids())?)
    }

    /// Ask the server to pick one dog from the favorites
    pub fn find_match(&self) -> Result<Dog, BrowseError> {
        if self.favorites.is_empty() {
            return Err(BrowseError::NoFavorites);
        }
        let matched = self.catalog.match_dogs(self.favorites.ids())?;
        let dogs = self.catalog.dogs_by_ids(std::slice::from_ref(&matched.dog_id))?;
        dogs.into_iter().next().ok_or(BrowseError::EmptyMatch)
    }

    pub fn search_locations(
        &self,
        params: &LocationSearchParams,
    ) -> Result<(Vec<Location>, u64), BrowseError> {
        let found = self.catalog.search_locations(params)?;
        Ok((found.results, found.total))
    }

    /// Forget everything tied to the signed-in user
    pub fn reset(&mut self) {
        self.favorites.clear();
        self.results = ResultsPage::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::{DogSearchResponse, LocationSearchResponse, Match};
    use crate::api::ApiResult;
    use std::cell::RefCell;

    fn dog(id: &str, zip: &str) -> Dog {
        Dog {
            id: id.to_string(),
            img: format!("https://img.example/{}.jpg", id),
            name: format!("Dog {}", id),
            age: 3,
            zip_code: zip.to_string(),
            breed: "Beagle".to_string(),
        }
    }

    fn location(zip: &str) -> Location {
        Location {
            zip_code: zip.to_string(),
            latitude: 30.0,
            longitude: -97.0,
            city: "Austin".to_string(),
            state: "TX".to_string(),
            county: "Travis".to_string(),
        }
    }

    #[derive(Default)]
    struct FakeCatalog {
        searches: RefCell<Vec<DogSearchParams>>,
        detail_calls: RefCell<Vec<Vec<String>>>,
        zip_calls: RefCell<Vec<Vec<String>>>,
        breed_calls: RefCell<usize>,
        result_ids: Vec<String>,
        total: u64,
        matched: Option<String>,
        fail_locations: bool,
    }

    impl CatalogGateway for FakeCatalog {
        fn breeds(&self) -> ApiResult<Vec<String>> {
            *self.breed_calls.borrow_mut() += 1;
            Ok(vec!["Beagle".to_string(), "Poodle".to_string()])
        }

        fn search_dogs(&self, params: &DogSearchParams) -> ApiResult<DogSearchResponse> {
            self.searches.borrow_mut().push(params.clone());
            Ok(DogSearchResponse {
                result_ids: self.result_ids.clone(),
                total: self.total,
                next: None,
                prev: None,
            })
        }

        fn dogs_by_ids(&self, ids: &[String]) -> ApiResult<Vec<Dog>> {
            self.detail_calls.borrow_mut().push(ids.to_vec());
            Ok(ids
                .iter()
                .enumerate()
                .map(|(i, id)| dog(id, if i % 2 == 0 { "73301" } else { "10001" }))
                .collect())
        }

        fn match_dogs(&self, _ids: &[String]) -> ApiResult<Match> {
            match &self.matched {
                Some(id) => Ok(Match { dog_id: id.clone() }),
                None => Err(ApiError::Status {
                    code: 500,
                    body: "boom".to_string(),
                }),
            }
        }

        fn locations_by_zip(&self, zip_codes: &[String]) -> ApiResult<Vec<Location>> {
            self.zip_calls.borrow_mut().push(zip_codes.to_vec());
            if self.fail_locations {
                return Err(ApiError::Transport("offline".to_string()));
            }
            Ok(zip_codes.iter().map(|z| location(z)).collect())
        }

        fn search_locations(
            &self,
            _params: &LocationSearchParams,
        ) -> ApiResult<LocationSearchResponse> {
            Ok(LocationSearchResponse {
                results: vec![location("73301")],
                total: 1,
            })
        }
    }

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("d{}", i)).collect()
    }

    #[test]
    fn test_filters_default_params() {
        let filters = SearchFilters::new(25);
        let params = filters.to_params(12);
        assert_eq!(params.age_min, Some(0));
        assert_eq!(params.age_max, Some(25));
        assert_eq!(params.size, Some(12));
        assert_eq!(params.from, Some(0));
        assert_eq!(params.sort, Some(SortField::Breed));
        assert_eq!(params.sort_direction, Some(SortDirection::Asc));
        assert!(params.breeds.is_empty());
    }

    #[test]
    fn test_filter_change_resets_page() {
        let mut filters = SearchFilters::new(25);
        filters.set_page(4, 10);
        assert_eq!(filters.to_params(12).from, Some(36));

        filters.add_breed("Beagle");
        assert_eq!(filters.page(), 1);

        filters.set_page(3, 10);
        filters.set_sort(SortField::Breed, SortDirection::Desc);
        assert_eq!(filters.page(), 1);

        filters.set_page(3, 10);
        filters.set_zip_input("12345");
        assert_eq!(filters.page(), 1);

        filters.set_page(3, 10);
        filters.set_age_range(2, 8).unwrap();
        assert_eq!(filters.page(), 1);
    }

    #[test]
    fn test_breed_add_remove() {
        let mut filters = SearchFilters::new(25);
        assert!(filters.add_breed("Beagle"));
        assert!(!filters.add_breed("Beagle"));
        assert!(filters.add_breed("Golden Retriever"));
        assert!(filters.remove_breed("Beagle"));
        assert!(!filters.remove_breed("Beagle"));
        assert_eq!(filters.breeds(), &["Golden Retriever".to_string()]);
        filters.clear_breeds();
        assert!(filters.breeds().is_empty());
    }

    #[test]
    fn test_zip_input_parsing() {
        let mut filters = SearchFilters::new(25);
        filters.set_zip_input(" 12345, 67890 ,, ");
        assert_eq!(filters.zip_codes(), &["12345".to_string(), "67890".to_string()]);
        assert_eq!(filters.to_params(12).zip_codes.len(), 2);

        // Partial first zip is not sent
        filters.set_zip_input("123, 67890");
        assert!(filters.to_params(12).zip_codes.is_empty());

        filters.set_zip_input("");
        assert!(filters.zip_codes().is_empty());
    }

    #[test]
    fn test_age_range() {
        let mut filters = SearchFilters::new(25);
        assert!(filters.set_age_range(9, 2).is_err());
        filters.set_age_range(3, 40).unwrap();
        assert_eq!(filters.age_range(), (3, 25));
    }

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(0, 12), 0);
        assert_eq!(page_count(12, 12), 1);
        assert_eq!(page_count(13, 12), 2);
        assert_eq!(page_count(10_000, 12), 834);
        assert_eq!(page_count(5, 0), 0);
    }

    #[test]
    fn test_favorites_toggle() {
        let mut favs = Favorites::default();
        assert!(favs.toggle("a"));
        assert!(favs.toggle("b"));
        assert!(favs.contains("a"));
        assert!(!favs.toggle("a"));
        assert!(!favs.contains("a"));
        assert_eq!(favs.ids(), &["b".to_string()]);
        assert_eq!(favs.len(), 1);
        favs.clear();
        assert!(favs.is_empty());
    }

    #[test]
    fn test_refresh_loads_details_and_locations() {
        let catalog = FakeCatalog {
            result_ids: ids(3),
            total: 30,
            ..Default::default()
        };
        let mut browser = Browser::new(catalog, 12, 25);
        let page = browser.refresh().unwrap();
        assert_eq!(page.dogs.len(), 3);
        assert_eq!(page.total, 30);
        assert_eq!(page.locations.len(), 2);
        assert_eq!(browser.page_count(), 3);

        // Unique zips only, one lookup
        let zip_calls = browser.catalog.zip_calls.borrow();
        assert_eq!(zip_calls.len(), 1);
        assert_eq!(zip_calls[0].len(), 2);
    }

    #[test]
    fn test_refresh_empty_result_skips_lookups() {
        let mut browser = Browser::new(FakeCatalog::default(), 12, 25);
        let page = browser.refresh().unwrap();
        assert!(page.dogs.is_empty());
        assert!(browser.catalog.detail_calls.borrow().is_empty());
        assert!(browser.catalog.zip_calls.borrow().is_empty());
    }

    #[test]
    fn test_location_failure_is_not_fatal() {
        let catalog = FakeCatalog {
            result_ids: ids(2),
            total: 2,
            fail_locations: true,
            ..Default::default()
        };
        let mut browser = Browser::new(catalog, 12, 25);
        let page = browser.refresh().unwrap();
        assert_eq!(page.dogs.len(), 2);
        assert!(page.locations.is_empty());
    }

    #[test]
    fn test_paging_stays_in_bounds() {
        let catalog = FakeCatalog {
            result_ids: ids(12),
            total: 25,
            ..Default::default()
        };
        let mut browser = Browser::new(catalog, 12, 25);
        browser.refresh().unwrap();
        assert!(!browser.prev_page());
        assert!(browser.next_page());
        assert!(browser.next_page());
        assert!(!browser.next_page());
        assert_eq!(browser.filters.page(), 3);

        browser.refresh().unwrap();
        let searches = browser.catalog.searches.borrow();
        assert_eq!(searches.last().unwrap().from, Some(24));
        drop(searches);

        browser.go_to_page(0);
        assert_eq!(browser.filters.page(), 1);
        browser.go_to_page(99);
        assert_eq!(browser.filters.page(), 3);
    }

    #[test]
    fn test_match_requires_favorites() {
        let browser = Browser::new(FakeCatalog::default(), 12, 25);
        assert!(matches!(browser.find_match(), Err(BrowseError::NoFavorites)));
        assert!(browser.favorite_dogs().unwrap().is_empty());
        assert!(browser.catalog.detail_calls.borrow().is_empty());
    }

    #[test]
    fn test_match_fetches_matched_dog() {
        let catalog = FakeCatalog {
            matched: Some("d7".to_string()),
            ..Default::default()
        };
        let mut browser = Browser::new(catalog, 12, 25);
        browser.favorites.toggle("d7");
        browser.favorites.toggle("d9");
        let dog = browser.find_match().unwrap();
        assert_eq!(dog.id, "d7");
        assert_eq!(
            browser.catalog.detail_calls.borrow().last().unwrap(),
            &vec!["d7".to_string()]
        );
    }

    #[test]
    fn test_match_api_error_surfaces() {
        let mut browser = Browser::new(FakeCatalog::default(), 12, 25);
        browser.favorites.toggle("d1");
        assert!(matches!(browser.find_match(), Err(BrowseError::Api(_))));
    }

    #[test]
    fn test_breeds_cached() {
        let mut browser = Browser::new(FakeCatalog::default(), 12, 25);
        assert_eq!(browser.breeds().unwrap().len(), 2);
        assert_eq!(browser.breeds().unwrap().len(), 2);
        assert_eq!(*browser.catalog.breed_calls.borrow(), 1);
    }

    #[test]
    fn test_reset_clears_favorites() {
        let catalog = FakeCatalog {
            result_ids: ids(1),
            total: 1,
            ..Default::default()
        };
        let mut browser = Browser::new(catalog, 12, 25);
        browser.refresh().unwrap();
        browser.favorites.toggle("d0");
        browser.reset();
        assert!(browser.favorites.is_empty());
        assert!(browser.results().dogs.is_empty());
        let (found, total) = browser.search_locations(&LocationSearchParams::default()).unwrap();
        assert_eq!((found.len(), total), (1, 1));
    }
}
