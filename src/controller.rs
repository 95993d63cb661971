//! Sale session controller.
//!
//! Owns the [`Session`] for one POS terminal and keeps it consistent with
//! the remote sale it is bound to. Local edits (add, remove, select, keypad)
//! never touch the network. Remote sequences (save, assign table, open named
//! order, close and pay, load existing) run one at a time: an in-flight flag
//! rejects an overlapping sequence with [`PosError::Busy`] before it sends
//! anything.
//!
//! Saving always overwrites the remote line set with the whole cart. Adopting
//! a table that already has an open sale therefore replaces that sale's lines
//! with the cart (last writer wins), it never merges them.
//!
//! State is published to subscribers through a `watch` channel
//! ([`SessionView`]) and user-facing outcomes through a `broadcast` channel
//! ([`Notice`]).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::api::PosApi;
use crate::catalog::{Catalog, CategoryTab};
use crate::error::{PosError, PosResult};
use crate::models::{
    CategoryId, CreateSaleRequest, PaymentMethod, Product, ProductId, Sale, SaleDestination,
    SaleId, Table, TableId,
};
use crate::session::Session;
use crate::view::{self, Notice, OpenOrder, SessionView, TableSlot};

const NOTICE_CAPACITY: usize = 32;

/// RAII holder of the per-session in-flight flag.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> PosResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PosError::Busy)?;
        Ok(Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SaleController<A: PosApi> {
    api: A,
    session: Mutex<Session>,
    catalog: Mutex<Catalog>,
    tables: Mutex<Vec<Table>>,
    active_sales: Mutex<Vec<Sale>>,
    in_flight: AtomicBool,
    view_tx: watch::Sender<SessionView>,
    notice_tx: broadcast::Sender<Notice>,
}

impl<A: PosApi> SaleController<A> {
    pub fn new(api: A) -> Self {
        let (view_tx, _) = watch::channel(SessionView::default());
        let (notice_tx, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            api,
            session: Mutex::new(Session::new()),
            catalog: Mutex::new(Catalog::default()),
            tables: Mutex::new(Vec::new()),
            active_sales: Mutex::new(Vec::new()),
            in_flight: AtomicBool::new(false),
            view_tx,
            notice_tx,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view_tx.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notice_tx.subscribe()
    }

    /// Copy of the current session state.
    pub fn session(&self) -> Session {
        lock(&self.session).clone()
    }

    pub fn view(&self) -> SessionView {
        self.view_tx.borrow().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    // -----------------------------------------------------------------------
    // Publishing
    // -----------------------------------------------------------------------

    fn publish(&self) {
        let view = {
            let session = lock(&self.session);
            let tables = lock(&self.tables);
            SessionView::from_session(&session, &tables)
        };
        self.view_tx.send_replace(view);
    }

    fn notify(&self, notice: Notice) {
        // No receivers is fine: nobody is showing toasts.
        let _ = self.notice_tx.send(notice);
    }

    /// Publish the outcome of a remote sequence and hand the result back.
    fn report<T>(&self, action: &str, result: PosResult<T>, success: &str) -> PosResult<T> {
        match &result {
            Ok(_) => self.notify(Notice::success(success)),
            Err(e) if e.is_validation() => {
                debug!(action, error = %e, "sale operation rejected");
                self.notify(Notice::warning(e.to_string()));
            }
            Err(e) => {
                warn!(action, error = %e, "sale operation failed");
                self.notify(Notice::error(e.to_string()));
            }
        }
        self.publish();
        result
    }

    fn edit_session<R>(&self, f: impl FnOnce(&mut Session, &Catalog) -> R) -> R {
        let result = {
            let catalog = lock(&self.catalog);
            let mut session = lock(&self.session);
            f(&mut session, &catalog)
        };
        self.publish();
        result
    }

    // -----------------------------------------------------------------------
    // Start-up and catalog
    // -----------------------------------------------------------------------

    /// Load catalog, tables and open sales, then the sale named by the
    /// navigation context if there is one.
    pub async fn start(&self, sale_id: Option<SaleId>) -> PosResult<()> {
        let loaded = tokio::try_join!(
            self.api.list_products(),
            self.api.list_categories(),
            self.api.list_tables(),
            self.api.list_active_sales(),
        );
        let (products, categories, tables, active) = match loaded {
            Ok(v) => v,
            Err(e) => return self.report("start", Err(e), ""),
        };
        info!(
            products = products.len(),
            categories = categories.len(),
            tables = tables.len(),
            open_sales = active.len(),
            "POS data loaded"
        );
        *lock(&self.catalog) = Catalog::new(products, categories);
        *lock(&self.tables) = tables;
        *lock(&self.active_sales) = active;
        self.publish();

        match sale_id {
            Some(id) => self.load_existing(id).await,
            None => Ok(()),
        }
    }

    pub fn category_tabs(&self) -> Vec<CategoryTab> {
        lock(&self.catalog).tabs()
    }

    pub fn products_in(&self, category: Option<CategoryId>) -> Vec<Product> {
        lock(&self.catalog)
            .products_in(category)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn tables(&self) -> Vec<Table> {
        lock(&self.tables).clone()
    }

    /// Open sales as of the last fetch: bound to tables, then the rest.
    pub fn open_orders(&self) -> (Vec<OpenOrder>, Vec<OpenOrder>) {
        let active = lock(&self.active_sales);
        let tables = lock(&self.tables);
        (
            view::open_table_orders(&active, &tables),
            view::other_open_orders(&active),
        )
    }

    // -----------------------------------------------------------------------
    // Local edits
    // -----------------------------------------------------------------------

    pub fn add_line(&self, product_id: ProductId) -> bool {
        self.add_line_with_quantity(product_id, 1)
    }

    pub fn add_line_with_quantity(&self, product_id: ProductId, quantity: u32) -> bool {
        let added = self.edit_session(|session, catalog| {
            session.add_line_with_quantity(catalog, product_id, quantity)
        });
        if !added {
            debug!(product_id, quantity, "add ignored, unknown product or zero quantity");
        }
        added
    }

    pub fn remove_line(&self, index: usize) -> bool {
        self.edit_session(|session, _| session.remove_line(index))
    }

    pub fn remove_selected(&self) -> bool {
        self.edit_session(|session, _| session.remove_selected())
    }

    pub fn select_line(&self, index: usize) -> bool {
        self.edit_session(|session, _| session.select_line(index))
    }

    pub fn clear_selection(&self) {
        self.edit_session(|session, _| session.clear_selection());
    }

    pub fn numpad_input(&self, key: char) -> bool {
        self.edit_session(|session, _| session.numpad_input(key))
    }

    pub fn numpad_clear(&self) {
        self.edit_session(|session, _| session.numpad_clear());
    }

    /// Leave the bound table without touching the remote sale.
    pub fn exit_table_view(&self) {
        self.edit_session(|session, _| session.reset());
        info!("table view closed, session reset");
        self.notify(Notice::success("Table view closed"));
    }

    // -----------------------------------------------------------------------
    // Persist
    // -----------------------------------------------------------------------

    /// Push the cart to the bound sale. DIRECT sessions must pick a
    /// destination first ([`Self::assign_table`] or
    /// [`Self::open_named_order`]).
    pub async fn save(&self) -> PosResult<()> {
        let result: PosResult<()> = async {
            let _guard = InFlight::acquire(&self.in_flight)?;
            self.persist().await
        }
        .await;
        self.report("save", result, "Order updated")
    }

    /// Full overwrite of the bound sale's lines with a snapshot of the cart,
    /// followed by a refetch. The cart is never modified here.
    async fn persist(&self) -> PosResult<()> {
        let (sale_id, lines) = {
            let session = lock(&self.session);
            if session.cart().is_empty() {
                return Err(PosError::EmptyCart);
            }
            let sale_id = session.sale_id().ok_or(PosError::DestinationRequired)?;
            (sale_id, session.line_inputs())
        };

        self.api.update_sale_lines(sale_id, &lines).await?;
        info!(sale_id, lines = lines.len(), "sale lines overwritten");
        self.refresh_sale(sale_id).await;
        Ok(())
    }

    /// Refetch the bound sale for its server total. A failed refetch only
    /// leaves the previous snapshot in place.
    async fn refresh_sale(&self, sale_id: SaleId) {
        match self.api.get_sale(sale_id).await {
            Ok(sale) => {
                let total = sale.total;
                if lock(&self.session).set_current_sale(sale) {
                    debug!(sale_id, total, "sale refreshed");
                } else {
                    debug!(sale_id, "stale sale response dropped");
                }
            }
            Err(e) => warn!(sale_id, error = %e, "sale refresh failed"),
        }
    }

    // -----------------------------------------------------------------------
    // Destinations
    // -----------------------------------------------------------------------

    /// Tables with their occupancy, for the table picker.
    pub async fn table_options(&self) -> PosResult<Vec<TableSlot>> {
        let result = tokio::try_join!(self.api.list_tables(), self.api.list_active_sales());
        let (tables, active) = match result {
            Ok(v) => v,
            Err(e) => return self.report("table_options", Err(e), ""),
        };
        let slots = view::table_slots(&tables, &active);
        *lock(&self.tables) = tables;
        *lock(&self.active_sales) = active;
        Ok(slots)
    }

    /// Bind the session to a table and push the cart into its sale.
    ///
    /// An occupied table's open sale is adopted and its lines overwritten
    /// by the cart; a free table gets a new open sale.
    pub async fn assign_table(&self, table_id: TableId) -> PosResult<()> {
        let result: PosResult<()> = async {
            let _guard = InFlight::acquire(&self.in_flight)?;

            let (tables, active) =
                tokio::try_join!(self.api.list_tables(), self.api.list_active_sales())?;
            if !tables.iter().any(|t| t.id == table_id) {
                return Err(PosError::UnknownTable(table_id));
            }
            let existing = active
                .iter()
                .find(|s| s.is_open() && s.table_id == Some(table_id))
                .map(|s| s.id);
            *lock(&self.tables) = tables;
            *lock(&self.active_sales) = active;

            let sale_id = match existing {
                Some(id) => {
                    info!(table_id, sale_id = id, "adopting open sale of occupied table");
                    id
                }
                None => {
                    let sale = self
                        .api
                        .open_sale(&SaleDestination::Table { table_id })
                        .await?;
                    info!(table_id, sale_id = sale.id, "opened sale for free table");
                    lock(&self.active_sales).push(sale.clone());
                    sale.id
                }
            };
            self.bind_and_push(sale_id).await
        }
        .await;
        self.report("assign_table", result, "Order saved to table")
    }

    /// Open a named (takeaway) order and push the cart into it.
    pub async fn open_named_order(&self, name: &str) -> PosResult<()> {
        let result: PosResult<()> = async {
            let _guard = InFlight::acquire(&self.in_flight)?;
            let name = name.trim();
            if name.is_empty() {
                return Err(PosError::DestinationRequired);
            }
            let sale = self
                .api
                .open_sale(&SaleDestination::Named {
                    name: name.to_string(),
                })
                .await?;
            info!(sale_id = sale.id, name, "opened named order");
            lock(&self.active_sales).push(sale.clone());
            self.bind_and_push(sale.id).await
        }
        .await;
        self.report("open_named_order", result, "Order saved")
    }

    /// Attach to `sale_id`, then persist the cart. An empty cart still
    /// binds and refreshes the sale but fails with [`PosError::EmptyCart`].
    /// The binding stays even if the persist fails, so a retry of
    /// [`Self::save`] targets the same sale.
    async fn bind_and_push(&self, sale_id: SaleId) -> PosResult<()> {
        lock(&self.session).attach(sale_id);
        self.publish();

        let has_lines = !lock(&self.session).cart().is_empty();
        if has_lines {
            self.persist().await
        } else {
            self.refresh_sale(sale_id).await;
            Err(PosError::EmptyCart)
        }
    }

    // -----------------------------------------------------------------------
    // Close and pay
    // -----------------------------------------------------------------------

    /// Charge the order.
    ///
    /// ATTACHED: sync a non-empty cart, close the sale, reset the session.
    /// DIRECT: create-and-close a walk-up sale from the cart, clear the cart.
    /// Any failure leaves the session exactly as it was.
    pub async fn close_and_pay(&self, method: PaymentMethod) -> PosResult<()> {
        let result: PosResult<&str> = async {
            let _guard = InFlight::acquire(&self.in_flight)?;

            let (sale_id, lines) = {
                let session = lock(&self.session);
                (session.sale_id(), session.line_inputs())
            };

            match sale_id {
                Some(sale_id) => {
                    if !lines.is_empty() {
                        self.api.update_sale_lines(sale_id, &lines).await?;
                        debug!(sale_id, lines = lines.len(), "synced cart before close");
                    }
                    let closed = self.api.close_sale(sale_id, method).await?;
                    info!(sale_id, method = %method, total = closed.total, "sale closed and paid");
                    lock(&self.session).reset();
                    lock(&self.active_sales).retain(|s| s.id != sale_id);
                    Ok("Bill closed and charged")
                }
                None if lines.is_empty() => Err(PosError::NothingToClose),
                None => {
                    let sale = self
                        .api
                        .create_sale(&CreateSaleRequest {
                            payment_method: method,
                            lines,
                        })
                        .await?;
                    info!(sale_id = sale.id, method = %method, total = sale.total, "walk-up sale charged");
                    lock(&self.session).clear_cart();
                    Ok("Sale completed")
                }
            }
        }
        .await;

        match result {
            Ok(message) => self.report("close_and_pay", Ok(()), message),
            Err(e) => self.report("close_and_pay", Err(e), ""),
        }
    }

    // -----------------------------------------------------------------------
    // Load existing
    // -----------------------------------------------------------------------

    /// Replace the cart with an existing sale and bind to it.
    pub async fn load_existing(&self, sale_id: SaleId) -> PosResult<()> {
        let result: PosResult<()> = async {
            let _guard = InFlight::acquire(&self.in_flight)?;
            let sale = self.api.get_sale(sale_id).await?;
            let lines = sale.lines.len();
            {
                let catalog = lock(&self.catalog);
                lock(&self.session).load_sale(&catalog, sale);
            }
            info!(sale_id, lines, "existing sale loaded");
            Ok(())
        }
        .await;
        self.report("load_existing", result, "Order loaded")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::UNKNOWN_PRODUCT_NAME;
    use crate::models::{Category, LineInput, SaleLine, SaleStatus};
    use crate::session::SessionMode;
    use crate::view::NoticeLevel;
    use async_trait::async_trait;
    use std::collections::HashMap;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        UpdateLines(SaleId, Vec<LineInput>),
        Close(SaleId, PaymentMethod),
        Create(CreateSaleRequest),
        Open(SaleDestination),
    }

    #[derive(Default)]
    struct FakeState {
        products: Vec<Product>,
        tables: Vec<Table>,
        sales: HashMap<SaleId, Sale>,
        next_id: SaleId,
        calls: Vec<Call>,
        fail_update: bool,
        fail_close: bool,
        fail_create: bool,
    }

    /// In-memory backend that prices lines from its own product list and
    /// records every mutating call.
    #[derive(Default)]
    struct FakeApi {
        state: Mutex<FakeState>,
    }

    impl FakeApi {
        fn new() -> Self {
            let api = Self::default();
            {
                let mut st = api.state.lock().unwrap();
                st.products = vec![product(1, "Caña", 1.5), product(2, "Bravas", 4.0), product(3, "Café", 1.2)];
                st.tables = vec![table(1, "Terraza 1"), table(2, "Barra")];
                st.next_id = 100;
            }
            api
        }

        fn calls(&self) -> Vec<Call> {
            self.state.lock().unwrap().calls.clone()
        }

        fn remote_lines(&self, sale_id: SaleId) -> Vec<(ProductId, u32)> {
            self.state.lock().unwrap().sales[&sale_id]
                .lines
                .iter()
                .map(|l| (l.product_id, l.quantity))
                .collect()
        }

        fn insert_sale(&self, sale: Sale) {
            self.state.lock().unwrap().sales.insert(sale.id, sale);
        }

        fn priced(st: &FakeState, lines: &[LineInput]) -> Vec<SaleLine> {
            lines
                .iter()
                .map(|l| {
                    let price = st
                        .products
                        .iter()
                        .find(|p| p.id == l.product_id)
                        .map(|p| p.price)
                        .unwrap_or(0.0);
                    SaleLine {
                        id: None,
                        product_id: l.product_id,
                        quantity: l.quantity,
                        price_unit: price,
                        line_total: price * f64::from(l.quantity),
                        product: None,
                    }
                })
                .collect()
        }
    }

    fn remote(status: u16) -> PosError {
        PosError::Remote {
            status,
            message: format!("HTTP {status}"),
        }
    }

    #[async_trait]
    impl PosApi for FakeApi {
        async fn list_products(&self) -> PosResult<Vec<Product>> {
            Ok(self.state.lock().unwrap().products.clone())
        }

        async fn list_categories(&self) -> PosResult<Vec<Category>> {
            Ok(vec![Category {
                id: 1,
                name: "Bebidas".into(),
            }])
        }

        async fn list_tables(&self) -> PosResult<Vec<Table>> {
            Ok(self.state.lock().unwrap().tables.clone())
        }

        async fn list_active_sales(&self) -> PosResult<Vec<Sale>> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .sales
                .values()
                .filter(|s| s.is_open())
                .cloned()
                .collect())
        }

        async fn get_sale(&self, sale_id: SaleId) -> PosResult<Sale> {
            self.state
                .lock()
                .unwrap()
                .sales
                .get(&sale_id)
                .cloned()
                .ok_or_else(|| PosError::NotFound("Venta no encontrada".into()))
        }

        async fn open_sale(&self, destination: &SaleDestination) -> PosResult<Sale> {
            let mut st = self.state.lock().unwrap();
            st.calls.push(Call::Open(destination.clone()));
            st.next_id += 1;
            let (table_id, name) = match destination {
                SaleDestination::Table { table_id } => (Some(*table_id), None),
                SaleDestination::Named { name } => (None, Some(name.clone())),
            };
            let sale = open_sale(st.next_id, table_id, name, vec![]);
            st.sales.insert(sale.id, sale.clone());
            Ok(sale)
        }

        async fn update_sale_lines(&self, sale_id: SaleId, lines: &[LineInput]) -> PosResult<()> {
            let mut st = self.state.lock().unwrap();
            st.calls.push(Call::UpdateLines(sale_id, lines.to_vec()));
            if st.fail_update {
                return Err(remote(500));
            }
            let priced = Self::priced(&st, lines);
            let sale = st
                .sales
                .get_mut(&sale_id)
                .ok_or_else(|| PosError::NotFound("Venta no encontrada".into()))?;
            sale.total = priced.iter().map(|l| l.line_total).sum();
            sale.lines = priced;
            Ok(())
        }

        async fn close_sale(&self, sale_id: SaleId, method: PaymentMethod) -> PosResult<Sale> {
            let mut st = self.state.lock().unwrap();
            st.calls.push(Call::Close(sale_id, method));
            if st.fail_close {
                return Err(remote(503));
            }
            let sale = st
                .sales
                .get_mut(&sale_id)
                .ok_or_else(|| PosError::NotFound("Venta no encontrada".into()))?;
            sale.status = SaleStatus::Closed;
            sale.payment_method = Some(method.as_str().to_string());
            Ok(sale.clone())
        }

        async fn create_sale(&self, request: &CreateSaleRequest) -> PosResult<Sale> {
            let mut st = self.state.lock().unwrap();
            st.calls.push(Call::Create(request.clone()));
            if st.fail_create {
                return Err(remote(502));
            }
            st.next_id += 1;
            let lines = Self::priced(&st, &request.lines);
            let mut sale = open_sale(st.next_id, None, None, lines);
            sale.status = SaleStatus::Closed;
            sale.payment_method = Some(request.payment_method.as_str().to_string());
            st.sales.insert(sale.id, sale.clone());
            Ok(sale)
        }
    }

    fn product(id: ProductId, name: &str, price: f64) -> Product {
        Product {
            id,
            name: name.into(),
            price,
            tax: 0.0,
            active: true,
            category_id: Some(1),
            sku: None,
            category: None,
        }
    }

    fn table(id: TableId, name: &str) -> Table {
        Table {
            id,
            name: name.into(),
            description: None,
            is_active: true,
        }
    }

    fn open_sale(
        id: SaleId,
        table_id: Option<TableId>,
        name: Option<String>,
        lines: Vec<SaleLine>,
    ) -> Sale {
        Sale {
            id,
            total: lines.iter().map(|l| l.line_total).sum(),
            payment_method: None,
            status: SaleStatus::Open,
            created_at: None,
            table_id,
            name,
            lines,
            creator: None,
            closer: None,
        }
    }

    fn line(product_id: ProductId, quantity: u32, price: f64) -> SaleLine {
        SaleLine {
            id: None,
            product_id,
            quantity,
            price_unit: price,
            line_total: price * f64::from(quantity),
            product: None,
        }
    }

    async fn started() -> SaleController<FakeApi> {
        let controller = SaleController::new(FakeApi::new());
        controller.start(None).await.expect("start");
        controller
    }

    #[tokio::test]
    async fn save_on_empty_cart_makes_no_calls() {
        let controller = started().await;
        let mut notices = controller.notices();

        let err = controller.save().await.unwrap_err();
        assert_eq!(err, PosError::EmptyCart);
        assert!(controller.api().calls().is_empty());

        let notice = notices.recv().await.unwrap();
        assert_eq!(notice.level, NoticeLevel::Warning);
        assert_eq!(notice.message, "The cart is empty");
    }

    #[tokio::test]
    async fn save_in_direct_mode_requires_destination() {
        let controller = started().await;
        controller.add_line(1);
        assert_eq!(
            controller.save().await.unwrap_err(),
            PosError::DestinationRequired
        );
        assert!(controller.api().calls().is_empty());
    }

    #[tokio::test]
    async fn assign_occupied_table_overwrites_remote_lines() {
        let controller = started().await;
        controller
            .api()
            .insert_sale(open_sale(7, Some(2), None, vec![line(1, 2, 1.5)]));

        controller.add_line(2);
        controller.assign_table(2).await.expect("assign");

        assert_eq!(controller.api().remote_lines(7), vec![(2, 1)]);
        let session = controller.session();
        assert_eq!(session.mode(), SessionMode::Attached);
        assert_eq!(session.sale_id(), Some(7));
        assert_eq!(session.current_sale().map(|s| s.total), Some(4.0));
        assert!(!controller
            .api()
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Open(_))));
    }

    #[tokio::test]
    async fn assign_free_table_opens_sale_then_persists() {
        let controller = started().await;
        controller.add_line(1);
        controller.add_line(1);
        controller.assign_table(1).await.expect("assign");

        assert_eq!(
            controller.api().calls(),
            vec![
                Call::Open(SaleDestination::Table { table_id: 1 }),
                Call::UpdateLines(
                    101,
                    vec![LineInput {
                        product_id: 1,
                        quantity: 2
                    }]
                ),
            ]
        );
        let view = controller.view();
        assert_eq!(view.sale_id, Some(101));
        assert_eq!(view.header, "Terraza 1 (Ticket: 101)");
        assert_eq!(view.sale_total, Some(3.0));
    }

    #[tokio::test]
    async fn assign_unknown_table_is_rejected() {
        let controller = started().await;
        controller.add_line(1);
        assert_eq!(
            controller.assign_table(99).await.unwrap_err(),
            PosError::UnknownTable(99)
        );
        assert_eq!(controller.session().mode(), SessionMode::Direct);
        assert!(controller.api().calls().is_empty());
    }

    #[tokio::test]
    async fn failed_persist_keeps_cart_and_binding() {
        let controller = started().await;
        controller.add_line(3);
        controller.api().state.lock().unwrap().fail_update = true;

        let err = controller.assign_table(1).await.unwrap_err();
        assert_eq!(err, remote(500));
        let session = controller.session();
        assert_eq!(session.sale_id(), Some(101));
        assert_eq!(session.cart().len(), 1);

        controller.api().state.lock().unwrap().fail_update = false;
        controller.save().await.expect("retry");
        assert_eq!(controller.api().remote_lines(101), vec![(3, 1)]);
    }

    #[tokio::test]
    async fn close_attached_syncs_then_closes_then_resets() {
        let controller = started().await;
        controller
            .api()
            .insert_sale(open_sale(7, Some(2), None, vec![line(1, 1, 1.5)]));
        controller.load_existing(7).await.expect("load");
        controller.add_line(2);

        controller
            .close_and_pay(PaymentMethod::Card)
            .await
            .expect("close");

        assert_eq!(
            controller.api().calls(),
            vec![
                Call::UpdateLines(
                    7,
                    vec![
                        LineInput {
                            product_id: 1,
                            quantity: 1
                        },
                        LineInput {
                            product_id: 2,
                            quantity: 1
                        }
                    ]
                ),
                Call::Close(7, PaymentMethod::Card),
            ]
        );
        assert_eq!(controller.session(), Session::default());
        assert_eq!(controller.view().header, view::NO_TABLE_LABEL);
    }

    #[tokio::test]
    async fn close_attached_with_empty_cart_only_closes() {
        let controller = started().await;
        controller
            .api()
            .insert_sale(open_sale(7, Some(2), None, vec![]));
        controller.load_existing(7).await.expect("load");

        controller
            .close_and_pay(PaymentMethod::Cash)
            .await
            .expect("close");
        assert_eq!(
            controller.api().calls(),
            vec![Call::Close(7, PaymentMethod::Cash)]
        );
    }

    #[tokio::test]
    async fn close_direct_creates_sale_and_stays_direct() {
        let controller = started().await;
        controller.numpad_input('3');
        controller.add_line(1);
        controller.add_line(2);

        controller
            .close_and_pay(PaymentMethod::Cash)
            .await
            .expect("close");

        assert_eq!(
            controller.api().calls(),
            vec![Call::Create(CreateSaleRequest {
                payment_method: PaymentMethod::Cash,
                lines: vec![
                    LineInput {
                        product_id: 1,
                        quantity: 3
                    },
                    LineInput {
                        product_id: 2,
                        quantity: 1
                    },
                ],
            })]
        );
        let session = controller.session();
        assert!(session.cart().is_empty());
        assert_eq!(session.mode(), SessionMode::Direct);
        assert_eq!(session.sale_id(), None);
    }

    #[tokio::test]
    async fn close_direct_with_empty_cart_is_rejected() {
        let controller = started().await;
        assert_eq!(
            controller
                .close_and_pay(PaymentMethod::Cash)
                .await
                .unwrap_err(),
            PosError::NothingToClose
        );
        assert!(controller.api().calls().is_empty());
    }

    #[tokio::test]
    async fn failed_close_leaves_session_untouched() {
        let controller = started().await;
        controller
            .api()
            .insert_sale(open_sale(7, Some(2), None, vec![line(1, 1, 1.5)]));
        controller.load_existing(7).await.expect("load");
        controller.add_line(1);
        controller.api().state.lock().unwrap().fail_close = true;
        let before = controller.session();
        let mut notices = controller.notices();

        let err = controller
            .close_and_pay(PaymentMethod::Cash)
            .await
            .unwrap_err();
        assert_eq!(err, remote(503));
        assert_eq!(controller.session(), before);
        assert_eq!(notices.recv().await.unwrap().level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn failed_sync_before_close_skips_close_and_keeps_session() {
        let controller = started().await;
        controller
            .api()
            .insert_sale(open_sale(7, Some(2), None, vec![line(1, 1, 1.5)]));
        controller.load_existing(7).await.expect("load");
        controller.add_line(2);
        controller.api().state.lock().unwrap().fail_update = true;
        let before = controller.session();

        let err = controller
            .close_and_pay(PaymentMethod::Card)
            .await
            .unwrap_err();
        assert_eq!(err, remote(500));
        assert_eq!(controller.session(), before);
        let calls = controller.api().calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0], Call::UpdateLines(7, _)));
        assert!(!calls.iter().any(|c| matches!(c, Call::Close(..))));
    }

    #[tokio::test]
    async fn failed_direct_charge_keeps_cart() {
        let controller = started().await;
        controller.add_line(1);
        controller.add_line(3);
        controller.select_line(1);
        controller.api().state.lock().unwrap().fail_create = true;
        let before = controller.session();
        let mut notices = controller.notices();

        let err = controller
            .close_and_pay(PaymentMethod::Cash)
            .await
            .unwrap_err();
        assert_eq!(err, remote(502));
        assert_eq!(controller.session(), before);
        assert_eq!(controller.session().cart().len(), 2);
        assert_eq!(notices.recv().await.unwrap().level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn assign_table_with_empty_cart_binds_but_warns() {
        let controller = started().await;
        let mut notices = controller.notices();

        let err = controller.assign_table(1).await.unwrap_err();
        assert_eq!(err, PosError::EmptyCart);

        let session = controller.session();
        assert_eq!(session.mode(), SessionMode::Attached);
        assert_eq!(session.sale_id(), Some(101));
        assert_eq!(session.current_sale().map(|s| s.id), Some(101));
        assert_eq!(
            controller.api().calls(),
            vec![Call::Open(SaleDestination::Table { table_id: 1 })]
        );

        let notice = notices.recv().await.unwrap();
        assert_eq!(notice.level, NoticeLevel::Warning);
        assert_eq!(notice.message, "The cart is empty");
    }

    #[tokio::test]
    async fn zero_quantity_add_is_ignored() {
        let controller = started().await;
        assert!(!controller.add_line_with_quantity(1, 0));
        assert!(controller.view().lines.is_empty());
        assert!(controller.add_line_with_quantity(1, 2));
        assert_eq!(controller.view().lines[0].quantity, 2);
    }

    #[tokio::test]
    async fn load_existing_with_unknown_product_uses_placeholder() {
        let controller = started().await;
        controller.api().insert_sale(open_sale(
            9,
            Some(1),
            None,
            vec![line(1, 2, 1.5), line(77, 1, 6.75)],
        ));

        controller.start(Some(9)).await.expect("start with sale");

        let view = controller.view();
        assert_eq!(view.mode, SessionMode::Attached);
        assert_eq!(view.lines.len(), 2);
        assert_eq!(view.lines[1].name, UNKNOWN_PRODUCT_NAME);
        assert!((view.lines[1].unit_price - 6.75).abs() < f64::EPSILON);
        assert_eq!(view.header, "Terraza 1 (Ticket: 9)");
    }

    #[tokio::test]
    async fn load_missing_sale_surfaces_not_found() {
        let controller = started().await;
        let err = controller.load_existing(404).await.unwrap_err();
        assert!(matches!(err, PosError::NotFound(_)));
        assert_eq!(controller.session().mode(), SessionMode::Direct);
    }

    #[tokio::test]
    async fn open_named_order_binds_new_sale() {
        let controller = started().await;
        controller.add_line(3);
        controller
            .open_named_order("  Pedro  ")
            .await
            .expect("named order");

        assert_eq!(
            controller.api().calls()[0],
            Call::Open(SaleDestination::Named {
                name: "Pedro".into()
            })
        );
        assert_eq!(controller.session().sale_id(), Some(101));
        let (_, others) = controller.open_orders();
        assert_eq!(others[0].label, "Pedro");

        assert_eq!(
            controller.open_named_order("   ").await.unwrap_err(),
            PosError::DestinationRequired
        );
    }

    #[tokio::test]
    async fn overlapping_sequence_is_rejected_as_busy() {
        let controller = started().await;
        controller.add_line(1);
        let _held = InFlight::acquire(&controller.in_flight).unwrap();

        assert_eq!(controller.assign_table(1).await.unwrap_err(), PosError::Busy);
        assert_eq!(
            controller
                .close_and_pay(PaymentMethod::Cash)
                .await
                .unwrap_err(),
            PosError::Busy
        );
        assert!(controller.api().calls().is_empty());
        assert!(controller.is_busy());
    }

    #[tokio::test]
    async fn in_flight_flag_is_released_after_failure() {
        let controller = started().await;
        let _ = controller.save().await;
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn table_options_report_occupancy() {
        let controller = started().await;
        controller
            .api()
            .insert_sale(open_sale(7, Some(2), None, vec![line(2, 2, 4.0)]));

        let slots = controller.table_options().await.expect("options");
        assert!(slots[0].is_free());
        assert_eq!(slots[1].occupying_sale(), Some(7));
    }

    #[tokio::test]
    async fn exit_table_view_resets_without_calls() {
        let controller = started().await;
        controller
            .api()
            .insert_sale(open_sale(7, Some(2), None, vec![line(1, 1, 1.5)]));
        controller.load_existing(7).await.expect("load");

        controller.exit_table_view();
        assert_eq!(controller.session(), Session::default());
        assert!(controller.api().calls().is_empty());
    }

    #[tokio::test]
    async fn local_edits_publish_views() {
        let controller = started().await;
        let mut rx = controller.subscribe();
        rx.borrow_and_update();

        controller.add_line(1);
        assert!(rx.has_changed().unwrap());
        let view = rx.borrow_and_update().clone();
        assert_eq!(view.lines.len(), 1);
        assert!((view.cart_total - 1.5).abs() < f64::EPSILON);

        assert!(!controller.add_line(999));
        controller.select_line(0);
        assert_eq!(controller.view().selected, Some(0));
        assert!(controller.remove_selected());
        assert!(controller.view().lines.is_empty());
        assert_eq!(controller.view().selected, None);
    }
}
